//! Staging of tool input into a real file for tools that cannot read stdin.

use std::{io, path::Path};

use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// A uniquely named input file that is removed when the guard is dropped.
///
/// Removal runs on every exit path of the owning request: normal return,
/// early `?` return, or unwinding.
#[derive(Debug)]
pub struct StagedInput {
    path: TempPath,
}

impl StagedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Copy `input` into a fresh file in `dir` whose name ends with `suffix`.
pub async fn stage<R>(input: &mut R, suffix: &str, dir: &Path) -> io::Result<StagedInput>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let named = tempfile::Builder::new().suffix(suffix).tempfile_in(dir)?;
    let (file, path) = named.into_parts();
    // `path` owns the file from here on; an error below drops it and removes the file.
    let staged = StagedInput { path };

    let mut file = tokio::fs::File::from_std(file);
    tokio::io::copy(input, &mut file).await?;
    file.flush().await?;
    drop(file);

    Ok(staged)
}
