//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides, ToolsArgs, ToolsOverride};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "toolgate";
const ENV_PREFIX: &str = "TOOLGATE";
const DEFAULT_TOOLS_PATH: &str = "tools.json";
const DEFAULT_SNIPPET_DIR: &str = "saved";
const DEFAULT_TLS_CERT: &str = "cert.pem";
const DEFAULT_TLS_KEY: &str = "key.pem";
const UNSPECIFIED_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub tls: TlsSettings,
    pub tools: ToolSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub http_addr: Option<SocketAddr>,
    pub https_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub config_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub snippet_dir: PathBuf,
    pub staging_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings from the layered sources and apply the CLI overrides of the
/// selected command.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Tools(args)) => raw.apply_tools_override(&args.tools),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    tls: RawTlsSettings,
    tools: RawToolSettings,
    storage: RawStorageSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(addr) = overrides.http_addr.as_ref() {
            self.server.http_addr = Some(addr.clone());
        }
        if let Some(addr) = overrides.https_addr.as_ref() {
            self.server.https_addr = Some(addr.clone());
        }
        if let Some(path) = overrides.tls_cert.as_ref() {
            self.tls.cert_path = Some(path.clone());
        }
        if let Some(path) = overrides.tls_key.as_ref() {
            self.tls.key_path = Some(path.clone());
        }
        if let Some(dir) = overrides.snippet_dir.as_ref() {
            self.storage.snippet_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.staging_dir.as_ref() {
            self.storage.staging_dir = Some(dir.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }

        self.apply_tools_override(&overrides.tools);
    }

    fn apply_tools_override(&mut self, overrides: &ToolsOverride) {
        if let Some(path) = overrides.tools_path.as_ref() {
            self.tools.config_path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            tls,
            tools,
            storage,
            logging,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            tls: build_tls_settings(tls)?,
            tools: build_tool_settings(tools)?,
            storage: build_storage_settings(storage)?,
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let http_addr = parse_listen_addr(server.http_addr)
        .map_err(|reason| LoadError::invalid("server.http_addr", reason))?;
    let https_addr = parse_listen_addr(server.https_addr)
        .map_err(|reason| LoadError::invalid("server.https_addr", reason))?;

    if let (Some(http), Some(https)) = (http_addr, https_addr)
        && http == https
    {
        return Err(LoadError::invalid(
            "server.https_addr",
            format!("`{https}` is already used by the plaintext listener"),
        ));
    }

    Ok(ServerSettings {
        http_addr,
        https_addr,
    })
}

fn build_tls_settings(tls: RawTlsSettings) -> Result<TlsSettings, LoadError> {
    let cert_path = non_empty_path(tls.cert_path, DEFAULT_TLS_CERT, "tls.cert_path")?;
    let key_path = non_empty_path(tls.key_path, DEFAULT_TLS_KEY, "tls.key_path")?;
    Ok(TlsSettings {
        cert_path,
        key_path,
    })
}

fn build_tool_settings(tools: RawToolSettings) -> Result<ToolSettings, LoadError> {
    let config_path = non_empty_path(tools.config_path, DEFAULT_TOOLS_PATH, "tools.config_path")?;
    Ok(ToolSettings { config_path })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let snippet_dir = non_empty_path(
        storage.snippet_dir,
        DEFAULT_SNIPPET_DIR,
        "storage.snippet_dir",
    )?;

    let staging_dir = match storage.staging_dir {
        Some(dir) if dir.as_os_str().is_empty() => {
            return Err(LoadError::invalid(
                "storage.staging_dir",
                "path must not be empty",
            ));
        }
        Some(dir) => dir,
        None => std::env::temp_dir(),
    };

    Ok(StorageSettings {
        snippet_dir,
        staging_dir,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    http_addr: Option<String>,
    https_addr: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTlsSettings {
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawToolSettings {
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    snippet_dir: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

/// Parse a listen address. Blank disables the listener; a bare `:port`
/// listens on all interfaces.
fn parse_listen_addr(value: Option<String>) -> Result<Option<SocketAddr>, String> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let candidate = if trimmed.starts_with(':') {
        format!("{UNSPECIFIED_HOST}{trimmed}")
    } else {
        trimmed.to_string()
    };

    let addr: SocketAddr = candidate
        .parse()
        .map_err(|err| format!("`{trimmed}` is not a socket address: {err}"))?;
    if addr.port() == 0 {
        return Err("port must be greater than zero".to_string());
    }
    Ok(Some(addr))
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}
