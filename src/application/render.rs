//! Render pipeline: direct compilation and cached rendering of saved snippets.

use std::{io::Cursor, sync::Arc, time::Instant};

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    domain::{snippet::SnippetId, tools::ToolDescriptor},
    infra::{
        process::{ProcessRunner, RenderError, RenderOutput},
        snippets::{SnippetError, SnippetStore},
        telemetry::{RENDER_CACHE_HIT_TOTAL, RENDER_CACHE_MISS_TOTAL, TOOL_FAILURE_TOTAL},
    },
};

#[derive(Debug, Error)]
pub enum RenderServiceError {
    #[error(transparent)]
    Snippet(#[from] SnippetError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Coordinates the snippet store, the artifact cache and the process runner.
#[derive(Debug, Clone)]
pub struct RenderService {
    runner: Arc<ProcessRunner>,
    snippets: Arc<SnippetStore>,
}

impl RenderService {
    pub fn new(runner: Arc<ProcessRunner>, snippets: Arc<SnippetStore>) -> Self {
        Self { runner, snippets }
    }

    pub fn snippets(&self) -> &Arc<SnippetStore> {
        &self.snippets
    }

    /// Render `source` directly. Nothing is stored.
    pub async fn compile(
        &self,
        tool: &ToolDescriptor,
        source: Bytes,
    ) -> Result<RenderOutput, RenderServiceError> {
        self.runner
            .run_direct(tool, Cursor::new(source))
            .await
            .map_err(|err| record_failure(tool, err).into())
    }

    /// Render the snippet saved under `id`, serving a stored artifact when
    /// one exists.
    ///
    /// A stored artifact is authoritative for its id; it is never compared
    /// against the current snippet contents.
    pub async fn render_by_id(
        &self,
        tool: &ToolDescriptor,
        id: &SnippetId,
    ) -> Result<RenderOutput, RenderServiceError> {
        let started_at = Instant::now();

        if let Some(artifact) = self.snippets.read_artifact(tool, id).await {
            counter!(RENDER_CACHE_HIT_TOTAL, "tool" => tool.name.clone()).increment(1);
            info!(
                target = "toolgate::render",
                op = "render::render_by_id",
                result = "cache_hit",
                tool = %tool.name,
                id = %id,
                bytes = artifact.len(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "Served cached render"
            );
            return Ok(RenderOutput::new(tool, artifact));
        }
        counter!(RENDER_CACHE_MISS_TOTAL, "tool" => tool.name.clone()).increment(1);

        let snippet = self.snippets.open(tool, id).await?;

        let sink = match self.snippets.create_artifact(tool, id) {
            Ok(sink) => Some(sink),
            Err(err) => {
                warn!(
                    target = "toolgate::render",
                    op = "render::create_artifact",
                    tool = %tool.name,
                    id = %id,
                    error = %err,
                    "Could not create artifact file; rendering without caching"
                );
                None
            }
        };

        let completed = self
            .runner
            .run(tool, snippet, sink)
            .await
            .map_err(|err| record_failure(tool, err))?;

        let cached = match completed.sink {
            Some(sink) => match sink.commit().await {
                Ok(_) => true,
                Err(err) => {
                    warn!(
                        target = "toolgate::render",
                        op = "render::commit_artifact",
                        tool = %tool.name,
                        id = %id,
                        error = %err,
                        "Could not publish artifact; next render will run the tool again"
                    );
                    false
                }
            },
            None => false,
        };

        info!(
            target = "toolgate::render",
            op = "render::render_by_id",
            result = "cache_miss",
            tool = %tool.name,
            id = %id,
            cached,
            bytes = completed.output.body.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Rendered snippet"
        );

        Ok(completed.output)
    }
}

fn record_failure(tool: &ToolDescriptor, err: RenderError) -> RenderError {
    if is_tool_failure(&err) {
        counter!(TOOL_FAILURE_TOTAL, "tool" => tool.name.clone()).increment(1);
    }
    err
}

/// Whether the tool itself failed, as opposed to local staging or pipe i/o.
fn is_tool_failure(err: &RenderError) -> bool {
    matches!(err, RenderError::Spawn { .. } | RenderError::Failed { .. })
}

#[cfg(test)]
mod failure_tests {
    use super::*;
    use std::io;

    #[test]
    fn only_spawn_and_exit_failures_count_against_the_tool() {
        let spawn = RenderError::Spawn {
            tool: "dot".to_string(),
            command: "dot".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        let failed = RenderError::Failed {
            tool: "dot".to_string(),
            exit_code: Some(1),
            stderr: "syntax error".to_string(),
        };
        let staging = RenderError::Staging {
            tool: "dot".to_string(),
            source: io::Error::other("disk full"),
        };
        let pipe = RenderError::Io {
            tool: "dot".to_string(),
            source: io::Error::other("broken pipe"),
        };

        assert!(is_tool_failure(&spawn));
        assert!(is_tool_failure(&failed));
        assert!(!is_tool_failure(&staging));
        assert!(!is_tool_failure(&pipe));
    }
}
