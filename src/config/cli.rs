use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the toolgate binary.
#[derive(Debug, Parser)]
#[command(
    name = "toolgate",
    version,
    about = "HTTP gateway for diagram and markup renderers"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TOOLGATE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP and HTTPS listeners.
    Serve(Box<ServeArgs>),
    /// Load the tool definitions, print them and exit.
    #[command(name = "tools")]
    Tools(ToolsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ToolsOverride {
    /// Override the JSON file holding the tool definitions.
    #[arg(long = "tools", visible_alias = "cfg", value_name = "PATH")]
    pub tools_path: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ToolsArgs {
    #[command(flatten)]
    pub tools: ToolsOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub tools: ToolsOverride,

    /// Plaintext listen address, e.g. `127.0.0.1:8080` or `:8080`.
    #[arg(long = "http", value_name = "ADDR")]
    pub http_addr: Option<String>,

    /// TLS listen address, e.g. `0.0.0.0:8443` or `:8443`.
    #[arg(long = "https", value_name = "ADDR")]
    pub https_addr: Option<String>,

    /// Override the TLS certificate (PEM) path.
    #[arg(long = "cert", value_name = "PATH")]
    pub tls_cert: Option<PathBuf>,

    /// Override the TLS private key (PEM) path.
    #[arg(long = "key", value_name = "PATH")]
    pub tls_key: Option<PathBuf>,

    /// Override the directory where snippets and rendered artifacts are saved.
    #[arg(short = 'd', long = "snippet-dir", value_name = "PATH")]
    pub snippet_dir: Option<PathBuf>,

    /// Override the directory used to stage input for file-based tools.
    #[arg(long = "staging-dir", value_name = "PATH")]
    pub staging_dir: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
