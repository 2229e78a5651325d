mod middleware;
mod routes;

pub use routes::{HttpState, build_router};

use std::error::Error as StdError;

use axum::http::StatusCode;
use http_body_util::LengthLimitError;

use crate::{
    application::{error::HttpError, render::RenderServiceError},
    infra::{process::RenderError, snippets::SnippetError},
};

/// Map a render failure to the response the client sees.
pub fn render_error_to_http(source: &'static str, err: RenderServiceError) -> HttpError {
    match err {
        RenderServiceError::Snippet(err) => snippet_error_to_http(source, err),
        RenderServiceError::Render(err) => process_error_to_http(source, err),
    }
}

/// Map a snippet store failure. Every open failure looks the same to clients.
pub fn snippet_error_to_http(source: &'static str, err: SnippetError) -> HttpError {
    match err {
        SnippetError::TooLarge { .. } => {
            HttpError::from_error(source, StatusCode::BAD_REQUEST, "body too large", &err)
        }
        SnippetError::Unavailable { .. } => {
            HttpError::from_error(source, StatusCode::BAD_REQUEST, "couldn't open file", &err)
        }
        SnippetError::Write { .. } => HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "couldn't create file",
            &err,
        ),
    }
}

/// Map a failure to read a request body. Only an exceeded limit is reported
/// as an oversized body.
pub fn body_error_to_http(source: &'static str, err: axum::Error) -> HttpError {
    let mut over_limit = false;
    let mut current: Option<&(dyn StdError + 'static)> = Some(&err);
    while let Some(inner) = current {
        if inner.is::<LengthLimitError>() {
            over_limit = true;
            break;
        }
        current = inner.source();
    }

    let message = if over_limit {
        "body too large"
    } else {
        "couldn't read request body"
    };
    HttpError::from_error(source, StatusCode::BAD_REQUEST, message, &err)
}

/// Map a tool invocation failure. Tool diagnostics go back to the client
/// verbatim.
pub fn process_error_to_http(source: &'static str, err: RenderError) -> HttpError {
    match err {
        RenderError::Failed {
            ref tool,
            exit_code,
            ref stderr,
        } => {
            let detail = match exit_code {
                Some(code) => format!("`{tool}` exited with status {code}"),
                None => format!("`{tool}` was terminated by a signal"),
            };
            HttpError::new(source, StatusCode::BAD_REQUEST, stderr.clone(), detail)
        }
        RenderError::Spawn { .. } => {
            HttpError::from_error(source, StatusCode::BAD_REQUEST, err.to_string(), &err)
        }
        RenderError::Staging { .. } => HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "couldn't create temporary file",
            &err,
        ),
        RenderError::Io { .. } => HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "tool i/o failure",
            &err,
        ),
    }
}
