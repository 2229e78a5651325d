//! Infrastructure adapters and runtime bootstrap.

pub mod assets;
pub mod error;
pub mod http;
pub mod process;
pub mod snippets;
pub mod telemetry;
pub mod tool_config;
