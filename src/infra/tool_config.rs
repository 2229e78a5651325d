//! Loads the tool table from its JSON file.

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;

use crate::domain::tools::{ToolDescriptor, ToolRegistry, ToolValidationError};

#[derive(Debug, Error)]
pub enum ToolConfigError {
    #[error("failed to read tool definitions from `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse tool definitions in `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid tool definitions in `{path}`: {source}")]
    Validation {
        path: PathBuf,
        #[source]
        source: ToolValidationError,
    },
}

/// Read and validate the tool table. Any failure here is fatal at startup.
pub fn load(path: &Path) -> Result<ToolRegistry, ToolConfigError> {
    let raw = std::fs::read(path).map_err(|source| ToolConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let registry = parse(&raw).map_err(|err| err.at(path))?;

    info!(
        target = "toolgate::tools",
        path = %path.display(),
        tools = registry.len(),
        "Loaded tool definitions"
    );
    Ok(registry)
}

/// Parse a JSON array of tool descriptors.
pub fn parse(raw: &[u8]) -> Result<ToolRegistry, ParseFailure> {
    let descriptors: Vec<ToolDescriptor> =
        serde_json::from_slice(raw).map_err(ParseFailure::Json)?;
    ToolRegistry::new(descriptors).map_err(ParseFailure::Invalid)
}

#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error(transparent)]
    Json(serde_json::Error),
    #[error(transparent)]
    Invalid(ToolValidationError),
}

impl ParseFailure {
    fn at(self, path: &Path) -> ToolConfigError {
        let path = path.to_path_buf();
        match self {
            Self::Json(source) => ToolConfigError::Parse { path, source },
            Self::Invalid(source) => ToolConfigError::Validation { path, source },
        }
    }
}
