//! Stateless JSON-RPC over HTTP (actix-web).
//!
//! Each `POST` carries exactly one JSON-RPC message. Requests get the
//! response as JSON; notifications get `202 Accepted` with an empty body.

use std::future::Future;

use actix_web::middleware::Logger;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, Responder, get, web};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::HttpConfig;
use crate::mcp::{JsonRpcResponse, McpServer, PARSE_ERROR};
use crate::openapi;
use crate::transport::host_guard::HostGuard;

/// Shared per-app state.
pub struct HttpState {
    server: McpServer,
    guard: HostGuard,
}

impl HttpState {
    pub fn new(server: McpServer, guard: HostGuard) -> Self {
        Self { server, guard }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// JSON-RPC endpoint. The mount path comes from `MCP_HTTP_PATH`.
#[utoipa::path(
    post,
    path = "/mcp",
    request_body(content = String, content_type = "application/json", description = "One JSON-RPC 2.0 message"),
    responses(
        (status = 200, description = "JSON-RPC response"),
        (status = 202, description = "Notification accepted"),
        (status = 403, description = "Origin not allowed"),
        (status = 421, description = "Host not allowed")
    )
)]
pub async fn mcp_endpoint(
    state: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    if let Err(rejection) = state.guard.check_request(&req) {
        tracing::warn!(reason = %rejection.message(), "rejected mcp request");
        return HttpResponse::build(rejection.status()).json(json!({ "error": rejection.message() }));
    }

    let response = match std::str::from_utf8(&body) {
        Ok(text) => state.server.handle_text(text).await,
        Err(e) => Some(JsonRpcResponse::error(
            serde_json::Value::Null,
            PARSE_ERROR,
            format!("Parse error: {e}"),
        )),
    };
    match response {
        Some(response) => HttpResponse::Ok().json(response),
        None => HttpResponse::Accepted().finish(),
    }
}

/// Register the health probe and the JSON-RPC endpoint at `path`.
pub fn configure(cfg: &mut web::ServiceConfig, path: &str) {
    cfg.service(health)
        .service(web::resource(path).route(web::post().to(mcp_endpoint)));
}

/// Serve until `shutdown` resolves, then stop gracefully.
pub async fn run(
    server: McpServer,
    config: &HttpConfig,
    bind: &str,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let state = web::Data::new(HttpState::new(server, HostGuard::from_config(config)));
    let path = config.path.clone();
    tracing::info!(bind = %bind, path = %path, "starting http transport");

    let http = HttpServer::new(move || {
        let path = path.clone();
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default().exclude("/health"))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .configure(move |cfg| configure(cfg, &path))
    })
    .disable_signals()
    .bind(bind)
    .with_context(|| format!("bind http transport on {bind}"))?
    .run();

    let handle = http.handle();
    tokio::select! {
        result = http => result.context("http server failed")?,
        () = shutdown => {
            tracing::info!("shutting down http transport");
            handle.stop(true).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::http::{StatusCode, header};
    use actix_web::test;
    use serde_json::Value;

    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::dispatcher::ToolDispatcher;
    use crate::paths::PathResolver;
    use crate::player::PlayerCommand;
    use crate::supervisor::PlaybackSupervisor;
    use crate::test_support;

    fn state(root: &std::path::Path) -> web::Data<HttpState> {
        let supervisor = PlaybackSupervisor::new(
            PathResolver::new(root, "wav", 8).unwrap(),
            PlayerCommand::new("/definitely/not/ffplay", "dev"),
            Arc::new(ManualClock::new(0)),
            Duration::from_millis(100),
        );
        let server = McpServer::new(ToolDispatcher::new(Arc::new(supervisor)));
        let guard = HostGuard::new(
            true,
            vec!["127.0.0.1:*".to_string(), "localhost:*".to_string()],
            vec!["http://localhost:*".to_string()],
        );
        web::Data::new(HttpState::new(server, guard))
    }

    fn post(body: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/mcp")
            .insert_header((header::HOST, "127.0.0.1:8765"))
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload(body.to_string())
    }

    #[actix_web::test]
    async fn tools_call_round_trip() {
        let (_dir, root) = test_support::audio_root(&["a.wav", "sub/b.mp3"]);
        let app = test::init_service(
            App::new()
                .app_data(state(&root))
                .configure(|cfg| configure(cfg, "/mcp")),
        )
        .await;

        let req = post(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"audio_playback","arguments":{"action":"list_files"}}}"#,
        )
        .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], 1);
        let files = &body["result"]["structuredContent"]["files"];
        assert_eq!(files["count"], 2);
        assert_eq!(files["files"][1]["filename"], "sub/b.mp3");
    }

    #[actix_web::test]
    async fn notification_is_accepted_without_body() {
        let (_dir, root) = test_support::audio_root(&[]);
        let app = test::init_service(
            App::new()
                .app_data(state(&root))
                .configure(|cfg| configure(cfg, "/mcp")),
        )
        .await;

        let req = post(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[actix_web::test]
    async fn malformed_body_is_parse_error() {
        let (_dir, root) = test_support::audio_root(&[]);
        let app = test::init_service(
            App::new()
                .app_data(state(&root))
                .configure(|cfg| configure(cfg, "/mcp")),
        )
        .await;

        let body: Value = test::call_and_read_body_json(&app, post("{oops").to_request()).await;
        assert_eq!(body["error"]["code"], PARSE_ERROR);
    }

    #[actix_web::test]
    async fn foreign_host_and_origin_are_refused() {
        let (_dir, root) = test_support::audio_root(&[]);
        let app = test::init_service(
            App::new()
                .app_data(state(&root))
                .configure(|cfg| configure(cfg, "/mcp")),
        )
        .await;
        let ping = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

        let req = test::TestRequest::post()
            .uri("/mcp")
            .insert_header((header::HOST, "rebind.example:8765"))
            .set_payload(ping)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::MISDIRECTED_REQUEST);

        let req = post(ping)
            .insert_header((header::ORIGIN, "http://evil.example"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = post(ping)
            .insert_header((header::ORIGIN, "http://localhost:5173"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn custom_path_and_health() {
        let (_dir, root) = test_support::audio_root(&[]);
        let app = test::init_service(
            App::new()
                .app_data(state(&root))
                .configure(|cfg| configure(cfg, "/rpc")),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");

        let req = test::TestRequest::post()
            .uri("/rpc")
            .insert_header((header::HOST, "localhost"))
            .set_payload(r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], 3);

        let req = post(r#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
