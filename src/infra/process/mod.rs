//! External tool invocation.
//!
//! [`ProcessRunner`] wires a request's input into the configured program,
//! either on stdin or through a staged file whose path is appended to the
//! tool's arguments, and captures stdout and stderr in memory. Stdout can be
//! duplicated into an artifact sink while it is read.

mod staging;
mod tee;

use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Instant,
};

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    process::Command,
};
use tracing::{debug, info, warn};

use crate::domain::tools::{OutputEncoding, ToolDescriptor};

pub use staging::{StagedInput, stage};
pub use tee::TeeWriter;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Header announcing base64-encoded bodies.
pub const CONTENT_TRANSFER_ENCODING: HeaderName =
    HeaderName::from_static("content-transfer-encoding");

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to stage input for `{tool}`: {source}")]
    Staging {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to start `{command}` for `{tool}`: {source}")]
    Spawn {
        tool: String,
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{tool}` exited unsuccessfully (exit {exit_code:?})")]
    Failed {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("i/o failure while running `{tool}`: {source}")]
    Io {
        tool: String,
        #[source]
        source: io::Error,
    },
}

/// Successful tool output, ready to be sent to the client.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub body: Bytes,
    pub content_type: String,
    pub encoding: OutputEncoding,
}

impl RenderOutput {
    pub fn new(tool: &ToolDescriptor, body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            content_type: tool.content_type().to_string(),
            encoding: tool.output_encoding,
        }
    }
}

impl IntoResponse for RenderOutput {
    fn into_response(self) -> Response {
        let (body, transfer_encoding) = match self.encoding {
            OutputEncoding::Raw => (self.body, None),
            OutputEncoding::Base64 => (
                Bytes::from(STANDARD.encode(&self.body)),
                Some(HeaderValue::from_static("base64")),
            ),
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = StatusCode::OK;

        let headers = response.headers_mut();
        match HeaderValue::from_str(&self.content_type) {
            Ok(value) => {
                headers.insert(CONTENT_TYPE, value);
            }
            Err(_) => {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(crate::domain::tools::DEFAULT_CONTENT_TYPE),
                );
            }
        }
        if let Some(value) = transfer_encoding {
            headers.insert(CONTENT_TRANSFER_ENCODING, value);
        }

        response
    }
}

/// A completed run: the client output plus the tee sink if it received the
/// whole of stdout and closed cleanly.
#[derive(Debug)]
pub struct Completed<S> {
    pub output: RenderOutput,
    pub sink: Option<S>,
}

/// Runs configured tools. Holds no per-request state.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    staging_dir: PathBuf,
}

impl ProcessRunner {
    pub fn new(staging_dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&staging_dir)?;
        Ok(Self { staging_dir })
    }

    /// Run `tool` over `input` without duplicating its output anywhere.
    pub async fn run_direct<R>(
        &self,
        tool: &ToolDescriptor,
        input: R,
    ) -> Result<RenderOutput, RenderError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let completed = self.run(tool, input, None::<tokio::io::Sink>).await?;
        Ok(completed.output)
    }

    /// Run `tool` over `input`, duplicating stdout into `sink` when given.
    ///
    /// The sink is closed once the process has exited. It is returned only
    /// when the tool succeeded and the sink accepted every byte; otherwise it
    /// is dropped here.
    pub async fn run<R, S>(
        &self,
        tool: &ToolDescriptor,
        mut input: R,
        sink: Option<S>,
    ) -> Result<Completed<S>, RenderError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        S: AsyncWrite + Unpin,
    {
        let started_at = Instant::now();

        // Held until the process has exited; dropping it removes the file.
        let staged = if tool.needs_file {
            let staged = stage(&mut input, &tool.suffix, &self.staging_dir)
                .await
                .map_err(|source| {
                    warn!(
                        target = "toolgate::process",
                        op = "process::stage",
                        tool = %tool.name,
                        staging_dir = %self.staging_dir.display(),
                        error = %source,
                        "Failed to stage tool input"
                    );
                    RenderError::Staging {
                        tool: tool.name.clone(),
                        source,
                    }
                })?;
            Some(staged)
        } else {
            None
        };

        let mut command = Command::new(&tool.command);
        command.args(&tool.args);
        match staged.as_ref() {
            Some(staged) => {
                command.arg(staged.path()).stdin(Stdio::null());
            }
            None => {
                command.stdin(Stdio::piped());
            }
        }
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| {
            warn!(
                target = "toolgate::process",
                op = "process::spawn",
                tool = %tool.name,
                command = %tool.command,
                error = %source,
                "Failed to spawn tool"
            );
            RenderError::Spawn {
                tool: tool.name.clone(),
                command: tool.command.clone(),
                source,
            }
        })?;

        let feeder = match (staged.is_none(), child.stdin.take()) {
            (true, Some(mut stdin)) => Some(tokio::spawn(async move {
                tokio::io::copy(&mut input, &mut stdin).await?;
                stdin.shutdown().await
            })),
            _ => None,
        };

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut captured = Vec::new();
                stderr.read_to_end(&mut captured).await.map(|_| captured)
            })
        });

        let io_error = |source: io::Error| RenderError::Io {
            tool: tool.name.clone(),
            source,
        };

        let mut tee = TeeWriter::new(Vec::new(), sink, tool.name.as_str());
        let copied = match child.stdout.take() {
            Some(mut stdout) => copy_stdout(&mut stdout, &mut tee).await,
            None => Ok(()),
        };
        if let Err(source) = copied {
            // Nobody will read the rest of stdout; stop the tool and reap it.
            let _ = child.kill().await;
            return Err(io_error(source));
        }

        let status = child.wait().await.map_err(io_error)?;
        let (stdout, sink) = tee.finish().await.map_err(io_error)?;
        drop(staged);

        if let Some(feeder) = feeder {
            match feeder.await {
                Ok(Ok(())) => {}
                // The tool may exit without draining its stdin.
                Ok(Err(err)) if err.kind() == ErrorKind::BrokenPipe => {}
                Ok(Err(err)) => {
                    debug!(
                        target = "toolgate::process",
                        op = "process::feed_stdin",
                        tool = %tool.name,
                        error = %err,
                        "Writing tool stdin failed"
                    );
                }
                Err(err) => {
                    debug!(
                        target = "toolgate::process",
                        op = "process::feed_stdin",
                        tool = %tool.name,
                        error = %err,
                        "Stdin feeder task aborted"
                    );
                }
            }
        }

        let stderr = match stderr_reader {
            Some(handle) => match handle.await {
                Ok(result) => result.map_err(io_error)?,
                Err(err) => return Err(io_error(io::Error::other(err))),
            },
            None => Vec::new(),
        };

        if !status.success() {
            return Err(self.failure(tool, status, stderr, started_at));
        }

        info!(
            target = "toolgate::process",
            op = "process::run",
            tool = %tool.name,
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            stdout_bytes = stdout.len(),
            teed = sink.is_some(),
            "Tool finished"
        );

        Ok(Completed {
            output: RenderOutput::new(tool, stdout),
            sink,
        })
    }

    fn failure(
        &self,
        tool: &ToolDescriptor,
        status: ExitStatus,
        stderr: Vec<u8>,
        started_at: Instant,
    ) -> RenderError {
        let exit_code = status.code();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        warn!(
            target = "toolgate::process",
            op = "process::run",
            tool = %tool.name,
            result = "error",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            exit_code = exit_code.map(i64::from).unwrap_or(-1),
            stderr = %stderr,
            "Tool returned an error"
        );
        RenderError::Failed {
            tool: tool.name.clone(),
            exit_code,
            stderr,
        }
    }
}

async fn copy_stdout<R, W>(stdout: &mut R, tee: &mut TeeWriter<Vec<u8>, W>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = stdout.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        tee.write_all(&chunk[..read]).await?;
    }
}
