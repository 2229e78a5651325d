//! Fan-out writer that duplicates a tool's stdout into a secondary sink.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Forwards every chunk to a primary writer and, best effort, to a secondary.
///
/// Primary failures are returned to the caller. A secondary failure is logged
/// and the secondary is dropped; the primary keeps receiving every byte.
pub struct TeeWriter<P, S> {
    primary: P,
    secondary: Option<S>,
    label: String,
}

impl<P, S> TeeWriter<P, S>
where
    P: AsyncWrite + Unpin,
    S: AsyncWrite + Unpin,
{
    pub fn new(primary: P, secondary: Option<S>, label: impl Into<String>) -> Self {
        Self {
            primary,
            secondary,
            label: label.into(),
        }
    }

    pub async fn write_all(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.primary.write_all(chunk).await?;

        let failed = match self.secondary.as_mut() {
            Some(secondary) => secondary.write_all(chunk).await.err(),
            None => None,
        };
        if let Some(err) = failed {
            self.drop_secondary("write", &err);
        }

        Ok(())
    }

    /// Flush and close both sides, returning the primary and the secondary if
    /// it received every byte intact.
    pub async fn finish(mut self) -> io::Result<(P, Option<S>)> {
        self.primary.flush().await?;

        let failed = match self.secondary.as_mut() {
            Some(secondary) => secondary.shutdown().await.err(),
            None => None,
        };
        if let Some(err) = failed {
            self.drop_secondary("close", &err);
        }

        Ok((self.primary, self.secondary))
    }

    fn drop_secondary(&mut self, stage: &'static str, err: &io::Error) {
        warn!(
            target = "toolgate::process::tee",
            op = "tee::write",
            stage,
            sink = %self.label,
            error = %err,
            "Secondary sink failed; continuing without it"
        );
        self.secondary = None;
    }
}
