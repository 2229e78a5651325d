use std::{net::SocketAddr, process, sync::Arc};

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::try_join;
use toolgate::{
    application::{error::AppError, render::RenderService},
    config,
    domain::tools::{OutputEncoding, ToolRegistry},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        process::ProcessRunner,
        snippets::SnippetStore,
        telemetry, tool_config,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Tools(_) => run_tools(settings),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    if settings.server.http_addr.is_none() && settings.server.https_addr.is_none() {
        return Err(AppError::from(InfraError::configuration(
            "no listener configured; set `server.http_addr` (--http) or `server.https_addr` (--https)",
        )));
    }

    let registry = tool_config::load(&settings.tools.config_path)?;
    let state = build_http_state(&settings, registry)?;
    let router = http::build_router(state);

    let plaintext = async {
        match settings.server.http_addr {
            Some(addr) => serve_plaintext(addr, router.clone()).await,
            None => Ok(()),
        }
    };
    let tls = async {
        match settings.server.https_addr {
            Some(addr) => serve_tls(addr, &settings.tls, router.clone()).await,
            None => Ok(()),
        }
    };

    try_join!(plaintext, tls)?;
    Ok(())
}

fn build_http_state(
    settings: &config::Settings,
    registry: ToolRegistry,
) -> Result<HttpState, AppError> {
    let snippets = SnippetStore::new(settings.storage.snippet_dir.clone()).map_err(|err| {
        InfraError::configuration(format!(
            "snippet directory `{}` is unusable: {err}",
            settings.storage.snippet_dir.display()
        ))
    })?;
    let runner = ProcessRunner::new(settings.storage.staging_dir.clone()).map_err(|err| {
        InfraError::configuration(format!(
            "staging directory `{}` is unusable: {err}",
            settings.storage.staging_dir.display()
        ))
    })?;

    let render = RenderService::new(Arc::new(runner), Arc::new(snippets));
    Ok(HttpState {
        registry,
        render: Arc::new(render),
    })
}

async fn serve_plaintext(addr: SocketAddr, router: Router) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| InfraError::listener(format!("failed to bind {addr}: {err}")))?;

    info!(target = "toolgate::server", addr = %addr, scheme = "http", "Listening");

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("http server error: {err}")))
}

async fn serve_tls(
    addr: SocketAddr,
    tls: &config::TlsSettings,
    router: Router,
) -> Result<(), AppError> {
    let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|err| {
            InfraError::configuration(format!(
                "failed to load TLS certificate `{}` / key `{}`: {err}",
                tls.cert_path.display(),
                tls.key_path.display()
            ))
        })?;

    info!(target = "toolgate::server", addr = %addr, scheme = "https", "Listening");

    axum_server::bind_rustls(addr, rustls)
        .serve(router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("https server error: {err}")))
}

fn run_tools(settings: config::Settings) -> Result<(), AppError> {
    let registry = tool_config::load(&settings.tools.config_path)?;

    println!(
        "{:<16} {:<8} {:<24} {:<8} COMMAND",
        "NAME", "INPUT", "CONTENT-TYPE", "ENCODING"
    );
    for tool in registry.iter() {
        let input = if tool.needs_file { "file" } else { "stdin" };
        let encoding = match tool.output_encoding {
            OutputEncoding::Raw => "raw",
            OutputEncoding::Base64 => "base64",
        };
        let mut command = tool.command.clone();
        for arg in &tool.args {
            command.push(' ');
            command.push_str(arg);
        }
        println!(
            "{:<16} {:<8} {:<24} {:<8} {}",
            tool.name,
            input,
            tool.content_type(),
            encoding,
            command
        );
    }

    Ok(())
}
