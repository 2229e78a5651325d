//! End-to-end tests for the per-tool routes.
//!
//! The router is driven in-process with `oneshot`; the tools are small shell
//! scripts written into a temporary directory.
#![cfg(unix)]

use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use toolgate::{
    application::render::RenderService,
    domain::{snippet::MAX_SNIPPET_BYTES, tools::ToolRegistry},
    infra::{
        http::{HttpState, build_router},
        process::ProcessRunner,
        snippets::SnippetStore,
        tool_config,
    },
};

struct Gateway {
    dir: TempDir,
    router: Router,
}

impl Gateway {
    /// Three tools: `echo` copies stdin, `args` prints its arguments and the
    /// contents of the staged file, `png` emits fixed binary bytes.
    fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let echo = script(&dir, "echo.sh", "cat\n");
        let args = script(
            &dir,
            "args.sh",
            "printf '%s|' \"$@\"\nlast=''\nfor a in \"$@\"; do last=$a; done\ncat \"$last\"\n",
        );
        let png = script(&dir, "png.sh", "cat >/dev/null\nprintf '\\211PNG\\r\\n'\n");
        let fail = script(&dir, "fail.sh", "cat >/dev/null\necho 'line 1: syntax error' >&2\nexit 3\n");

        let table = format!(
            r#"[
                {{"Name": "echo", "Cmd": "{echo}", "Suffix": ".txt", "Description": "Echo"}},
                {{"Name": "args", "Cmd": "{args}", "Args": ["-x"], "NeedsFile": true, "Suffix": ".src"}},
                {{"Name": "png", "Cmd": "{png}", "ContentType": "image/png", "OutputEncoding": "base64"}},
                {{"Name": "fail", "Cmd": "{fail}", "Suffix": ".bad"}},
                {{"Name": "missing", "Cmd": "{missing}"}}
            ]"#,
            missing = dir.path().join("not-installed").display(),
        );
        let registry = tool_config::parse(table.as_bytes()).expect("tool table");
        let router = router(&dir, registry);
        Self { dir, router }
    }

    fn saved_dir(&self) -> PathBuf {
        self.dir.path().join("saved")
    }

    async fn send(&self, method: Method, uri: &str, body: impl Into<Body>) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body.into())
            .expect("request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible router")
    }

    async fn post(&self, uri: &str, body: impl Into<Body>) -> Response {
        self.send(Method::POST, uri, body).await
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Method::GET, uri, Body::empty()).await
    }
}

fn script(dir: &TempDir, name: &str, body: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("set perms");
    path.display().to_string()
}

fn router(dir: &TempDir, registry: ToolRegistry) -> Router {
    let runner = ProcessRunner::new(dir.path().join("staging")).expect("runner");
    let snippets = SnippetStore::new(dir.path().join("saved")).expect("snippets");
    let render = RenderService::new(Arc::new(runner), Arc::new(snippets));
    build_router(HttpState {
        registry,
        render: Arc::new(render),
    })
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf-8 body")
}

fn header_value(response: &Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[tokio::test]
async fn root_redirects_to_first_tool() {
    let gateway = Gateway::new();
    let response = gateway.get("/").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header_value(&response, header::LOCATION).as_deref(),
        Some("/echo")
    );
}

#[tokio::test]
async fn index_page_lists_tools() {
    let gateway = Gateway::new();
    for uri in ["/args", "/args/"] {
        let response = gateway.get(uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("echo"));
        assert!(html.contains("png"));
    }
}

#[tokio::test]
async fn compile_returns_tool_output_with_default_content_type() {
    let gateway = Gateway::new();
    let response = gateway.post("/echo/c", "<svg/>").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_value(&response, header::CONTENT_TYPE).as_deref(),
        Some("image/svg+xml")
    );
    assert!(response.headers().get("content-transfer-encoding").is_none());
    assert_eq!(body_text(response).await, "<svg/>");
    assert_eq!(fs::read_dir(gateway.saved_dir()).expect("saved").count(), 0);
}

#[tokio::test]
async fn file_tools_receive_a_path_argument() {
    let gateway = Gateway::new();
    let response = gateway.post("/args/c", "from-file").await;

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    let (args, contents) = text.rsplit_once('|').expect("separator");
    let args: Vec<_> = args.split('|').collect();
    assert_eq!(args.len(), 2);
    assert_eq!(args[0], "-x");
    assert!(args[1].ends_with(".src"));
    assert_eq!(contents, "from-file");
    // The staged file is gone once the request completes.
    assert!(!PathBuf::from(args[1]).exists());
}

#[tokio::test]
async fn base64_tools_encode_the_body() {
    let gateway = Gateway::new();
    let response = gateway.post("/png/c", "ignored").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_value(&response, header::CONTENT_TYPE).as_deref(),
        Some("image/png")
    );
    assert_eq!(
        header_value(&response, header::HeaderName::from_static("content-transfer-encoding"))
            .as_deref(),
        Some("base64")
    );
    let decoded = STANDARD.decode(body_bytes(response).await).expect("base64");
    assert_eq!(decoded, b"\x89PNG\r\n");
}

#[tokio::test]
async fn tool_failure_returns_stderr_as_bad_request() {
    let gateway = Gateway::new();
    let response = gateway.post("/fail/c", "digraph {").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "line 1: syntax error\n");
}

#[tokio::test]
async fn missing_program_is_a_bad_request() {
    let gateway = Gateway::new();
    let response = gateway.post("/missing/c", "anything").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!body_text(response).await.is_empty());
}

#[tokio::test]
async fn save_then_load_round_trips() {
    let gateway = Gateway::new();
    let source = "graph { a -- b }";

    let response = gateway.post("/echo/s", source).await;
    assert_eq!(response.status(), StatusCode::OK);
    let id = body_text(response).await;
    assert_eq!(id.len(), 10);
    assert!(!id.ends_with('\n'));

    let again = body_text(gateway.post("/echo/s", source).await).await;
    assert_eq!(again, id);

    let loaded = gateway.get(&format!("/echo/l/{id}")).await;
    assert_eq!(loaded.status(), StatusCode::OK);
    assert_eq!(body_text(loaded).await, source);

    let mode = fs::metadata(gateway.saved_dir().join(format!("{id}.txt")))
        .expect("snippet file")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o644);
}

#[tokio::test]
async fn load_uses_the_last_path_segment() {
    let gateway = Gateway::new();
    let id = body_text(gateway.post("/echo/s", "nested").await).await;

    let response = gateway.get(&format!("/echo/l/some/prefix/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "nested");
}

#[tokio::test]
async fn unknown_snippet_is_a_bad_request() {
    let gateway = Gateway::new();

    let load = gateway.get("/echo/l/AAAAAAAAAA").await;
    assert_eq!(load.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(load).await, "couldn't open file");

    let render = gateway.get("/echo/d/AAAAAAAAAA").await;
    assert_eq!(render.status(), StatusCode::BAD_REQUEST);

    let traversal = gateway.get("/echo/l/..").await;
    assert_eq!(traversal.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_snippet_id_is_a_bad_request() {
    let gateway = Gateway::new();

    for uri in ["/echo/l/", "/echo/d/", "/echo/svg/", "/echo/l/abc/"] {
        let response = gateway.get(uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body_text(response).await, "couldn't open file", "{uri}");
    }
}

#[tokio::test]
async fn oversized_snippet_is_rejected_without_a_file() {
    let gateway = Gateway::new();
    let response = gateway
        .post("/echo/s", vec![b'x'; MAX_SNIPPET_BYTES + 1])
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "body too large");
    assert_eq!(fs::read_dir(gateway.saved_dir()).expect("saved").count(), 0);

    let at_limit = gateway.post("/echo/s", vec![b'x'; MAX_SNIPPET_BYTES]).await;
    assert_eq!(at_limit.status(), StatusCode::OK);
}

#[tokio::test]
async fn render_by_id_caches_and_serves_legacy_alias() {
    let gateway = Gateway::new();
    let id = body_text(gateway.post("/png/s", "diagram").await).await;

    let first = gateway.get(&format!("/png/d/{id}")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        header_value(&first, header::HeaderName::from_static("content-transfer-encoding"))
            .as_deref(),
        Some("base64")
    );
    let first_body = body_bytes(first).await;

    // The artifact holds raw bytes; the encoding is applied on the way out.
    let artifact = fs::read(gateway.saved_dir().join(format!("{id}.out"))).expect("artifact");
    assert_eq!(artifact, b"\x89PNG\r\n");

    let cached = gateway.get(&format!("/png/svg/{id}")).await;
    assert_eq!(cached.status(), StatusCode::OK);
    assert_eq!(
        header_value(&cached, header::HeaderName::from_static("content-transfer-encoding"))
            .as_deref(),
        Some("base64")
    );
    assert_eq!(body_bytes(cached).await, first_body);
}

#[tokio::test]
async fn failing_render_by_id_leaves_no_artifact() {
    let gateway = Gateway::new();
    let id = body_text(gateway.post("/fail/s", "broken").await).await;

    let response = gateway.get(&format!("/fail/d/{id}")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "line 1: syntax error\n");
    assert!(!gateway.saved_dir().join(format!("{id}.bad.out")).exists());
}

#[tokio::test]
async fn any_method_reaches_tool_routes() {
    let gateway = Gateway::new();
    let response = gateway.send(Method::PUT, "/echo/c", "put-body").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "put-body");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let gateway = Gateway::new();
    let response = gateway.get("/echo").await;
    assert!(response.headers().get("x-request-id").is_some());
}

#[tokio::test]
async fn static_assets_are_served() {
    let gateway = Gateway::new();

    let css = gateway.get("/static/style.css").await;
    assert_eq!(css.status(), StatusCode::OK);
    assert_eq!(
        header_value(&css, header::CONTENT_TYPE).as_deref(),
        Some("text/css")
    );

    let missing = gateway.get("/static/nope.css").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let gateway = Gateway::new();
    let response = gateway.get("/nope/c").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
