//! Filesystem-backed snippet and render-artifact storage.
//!
//! Snippets live in one directory shared by all tools, as `<id><suffix>`.
//! Rendered artifacts sit next to them as `<id><suffix>.out`.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use metrics::counter;
use tempfile::TempPath;
use thiserror::Error;
use tokio::{
    fs,
    io::{AsyncWrite, AsyncWriteExt},
};
use tracing::{info, warn};

use crate::{
    domain::{
        snippet::{MAX_SNIPPET_BYTES, SnippetId},
        tools::ToolDescriptor,
    },
    infra::telemetry::SNIPPET_SAVED_TOTAL,
};

const SNIPPET_FILE_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub enum SnippetError {
    #[error("snippet of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("snippet `{id}` could not be opened: {source}")]
    Unavailable {
        id: String,
        #[source]
        source: io::Error,
    },
    #[error("snippet `{id}` could not be written: {source}")]
    Write {
        id: String,
        #[source]
        source: io::Error,
    },
}

/// Filesystem-backed snippet storage.
#[derive(Debug)]
pub struct SnippetStore {
    root: PathBuf,
}

impl SnippetStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snippet_path(&self, tool: &ToolDescriptor, id: &SnippetId) -> PathBuf {
        self.root.join(tool.snippet_file_name(id.as_str()))
    }

    pub fn artifact_path(&self, tool: &ToolDescriptor, id: &SnippetId) -> PathBuf {
        self.root.join(tool.artifact_file_name(id.as_str()))
    }

    /// Persist `content` under its content-derived id and return the id.
    ///
    /// Oversized content is rejected before any hashing or I/O. Saving the
    /// same bytes twice rewrites the same file.
    pub async fn save(
        &self,
        tool: &ToolDescriptor,
        content: &[u8],
    ) -> Result<SnippetId, SnippetError> {
        if content.len() > MAX_SNIPPET_BYTES {
            return Err(SnippetError::TooLarge {
                size: content.len(),
                limit: MAX_SNIPPET_BYTES,
            });
        }

        let id = SnippetId::derive(content);
        let path = self.snippet_path(tool, &id);
        let write_error = |source: io::Error| SnippetError::Write {
            id: id.to_string(),
            source,
        };

        let mut file = fs::File::create(&path).await.map_err(write_error)?;
        set_snippet_permissions(&file).await.map_err(write_error)?;
        file.write_all(content).await.map_err(write_error)?;
        file.flush().await.map_err(write_error)?;

        counter!(SNIPPET_SAVED_TOTAL, "tool" => tool.name.clone()).increment(1);
        info!(
            target = "toolgate::snippets",
            op = "snippets::save",
            tool = %tool.name,
            id = %id,
            bytes = content.len(),
            "Snippet saved"
        );

        Ok(id)
    }

    /// Read a saved snippet back verbatim.
    pub async fn load(&self, tool: &ToolDescriptor, id: &SnippetId) -> Result<Bytes, SnippetError> {
        let path = self.snippet_path(tool, id);
        fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|source| SnippetError::Unavailable {
                id: id.to_string(),
                source,
            })
    }

    /// Open a saved snippet for streaming into a tool.
    pub async fn open(
        &self,
        tool: &ToolDescriptor,
        id: &SnippetId,
    ) -> Result<fs::File, SnippetError> {
        let path = self.snippet_path(tool, id);
        fs::File::open(&path)
            .await
            .map_err(|source| SnippetError::Unavailable {
                id: id.to_string(),
                source,
            })
    }

    /// Read the cached render for `id`, if one has been stored.
    ///
    /// Read failures other than absence are logged and treated as a miss.
    pub async fn read_artifact(&self, tool: &ToolDescriptor, id: &SnippetId) -> Option<Bytes> {
        let path = self.artifact_path(tool, id);
        match fs::read(&path).await {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(
                    target = "toolgate::snippets",
                    op = "snippets::read_artifact",
                    tool = %tool.name,
                    id = %id,
                    path = %path.display(),
                    error = %err,
                    "Failed to read cached artifact; re-rendering"
                );
                None
            }
        }
    }

    /// Start a new artifact for `id`. Nothing is visible under the artifact
    /// name until [`ArtifactSink::commit`] succeeds.
    pub fn create_artifact(
        &self,
        tool: &ToolDescriptor,
        id: &SnippetId,
    ) -> Result<ArtifactSink, io::Error> {
        let named = tempfile::Builder::new()
            .prefix(&format!(".{}", tool.snippet_file_name(id.as_str())))
            .suffix(".partial")
            .tempfile_in(&self.root)?;
        let (file, temp_path) = named.into_parts();
        Ok(ArtifactSink {
            file: fs::File::from_std(file),
            temp_path,
            target: self.artifact_path(tool, id),
        })
    }
}

#[cfg(unix)]
async fn set_snippet_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(std::fs::Permissions::from_mode(SNIPPET_FILE_MODE))
        .await
}

#[cfg(not(unix))]
async fn set_snippet_permissions(_file: &fs::File) -> io::Result<()> {
    let _ = SNIPPET_FILE_MODE;
    Ok(())
}

/// Write side of a render artifact.
///
/// Bytes go to a hidden temporary file in the snippet directory. Dropping the
/// sink without committing removes that file.
#[derive(Debug)]
pub struct ArtifactSink {
    file: fs::File,
    temp_path: TempPath,
    target: PathBuf,
}

impl ArtifactSink {
    /// Publish the artifact under its final name, replacing any existing one.
    pub async fn commit(self) -> io::Result<PathBuf> {
        let Self {
            mut file,
            temp_path,
            target,
        } = self;
        file.flush().await?;
        drop(file);
        temp_path.persist(&target).map_err(|err| err.error)?;
        Ok(target)
    }
}

impl AsyncWrite for ArtifactSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}
