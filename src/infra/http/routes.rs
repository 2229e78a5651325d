use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    extract::{DefaultBodyLimit, Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_TYPE, LOCATION},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
};

use crate::{
    application::{error::HttpError, render::RenderService},
    domain::{
        snippet::{MAX_SNIPPET_BYTES, SnippetId},
        tools::{ToolDescriptor, ToolRegistry},
    },
    infra::assets::serve_static,
    presentation::views::{IndexTemplate, render_template_response},
};

use super::{
    middleware::{log_responses, set_request_context},
    body_error_to_http, render_error_to_http, snippet_error_to_http,
};

#[derive(Clone)]
pub struct HttpState {
    pub registry: ToolRegistry,
    pub render: Arc<RenderService>,
}

/// State handed to the routes of a single tool.
#[derive(Clone)]
struct ToolContext {
    http: HttpState,
    tool: Arc<ToolDescriptor>,
}

/// Build the routing table: one route group per configured tool plus the
/// landing redirect and static assets. Every tool route answers any method.
pub fn build_router(state: HttpState) -> Router {
    let mut router = Router::new()
        .route("/", any(redirect_to_first_tool))
        .route("/static/{*path}", get(serve_static))
        .with_state(state.clone());

    for tool in state.registry.iter() {
        let base = format!("/{}", tool.name);
        let context = ToolContext {
            http: state.clone(),
            tool: Arc::clone(tool),
        };

        let tool_routes = Router::new()
            .route(&base, any(index))
            .route(&format!("{base}/"), any(index))
            .route(
                &format!("{base}/c"),
                any(compile).layer(DefaultBodyLimit::disable()),
            )
            .route(&format!("{base}/s"), any(save))
            .route(&format!("{base}/l/"), any(missing_id))
            .route(&format!("{base}/l/{{*id}}"), any(load))
            .route(&format!("{base}/d/"), any(missing_id))
            .route(&format!("{base}/d/{{*id}}"), any(render))
            .route(&format!("{base}/svg/"), any(missing_id))
            .route(&format!("{base}/svg/{{*id}}"), any(render))
            .with_state(context);

        router = router.merge(tool_routes);
    }

    router
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn redirect_to_first_tool(State(state): State<HttpState>) -> Response {
    let target = format!("/{}", state.registry.first().name);
    match HeaderValue::from_str(&target) {
        Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
        Err(err) => HttpError::new(
            "infra::http::redirect_to_first_tool",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Invalid redirect target",
            err.to_string(),
        )
        .into_response(),
    }
}

async fn index(State(ctx): State<ToolContext>) -> Response {
    render_template_response(
        IndexTemplate::new(&ctx.http.registry, &ctx.tool),
        StatusCode::OK,
    )
}

async fn compile(State(ctx): State<ToolContext>, body: Bytes) -> Response {
    match ctx.http.render.compile(&ctx.tool, body).await {
        Ok(output) => output.into_response(),
        Err(err) => render_error_to_http("infra::http::compile", err).into_response(),
    }
}

async fn save(State(ctx): State<ToolContext>, body: Body) -> Response {
    const SOURCE: &str = "infra::http::save";

    // One byte past the limit is enough to tell an oversized body apart.
    let content = match to_bytes(body, MAX_SNIPPET_BYTES + 1).await {
        Ok(content) => content,
        Err(err) => return body_error_to_http(SOURCE, err).into_response(),
    };

    match ctx.http.render.snippets().save(&ctx.tool, &content).await {
        Ok(id) => plain_text(id.to_string()),
        Err(err) => snippet_error_to_http(SOURCE, err).into_response(),
    }
}

async fn load(State(ctx): State<ToolContext>, Path(raw): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::load";

    let Some(id) = SnippetId::from_request_path(&raw) else {
        return unusable_id(SOURCE, &raw);
    };

    match ctx.http.render.snippets().load(&ctx.tool, &id).await {
        Ok(content) => content.into_response(),
        Err(err) => snippet_error_to_http(SOURCE, err).into_response(),
    }
}

async fn render(State(ctx): State<ToolContext>, Path(raw): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::render";

    let Some(id) = SnippetId::from_request_path(&raw) else {
        return unusable_id(SOURCE, &raw);
    };

    match ctx.http.render.render_by_id(&ctx.tool, &id).await {
        Ok(output) => output.into_response(),
        Err(err) => render_error_to_http(SOURCE, err).into_response(),
    }
}

async fn missing_id() -> Response {
    unusable_id("infra::http::missing_id", "")
}

fn unusable_id(source: &'static str, raw: &str) -> Response {
    HttpError::new(
        source,
        StatusCode::BAD_REQUEST,
        "couldn't open file",
        format!("`{raw}` does not name a snippet"),
    )
    .into_response()
}

fn plain_text(body: String) -> Response {
    let mut response = body.into_response();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
