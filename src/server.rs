//! MCP-compatible HTTP server.
//!
//! Every enabled backend is mounted at `/{name}` as a Streamable HTTP MCP
//! endpoint running in stateless mode. Before any handler runs, the context
//! pipeline middleware turns the request headers into a [`RequestContext`]
//! and stores it in the request extensions, where the MCP bridge picks it up.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/{backend}/tools` | List a backend's tools with schemas |
//! | `POST` | `/{backend}` | MCP JSON-RPC (Streamable HTTP) |
//!
//! # Error Contract
//!
//! Non-MCP error responses use the shape
//!
//! ```json
//! { "error": { "code": "not_found", "message": "unknown backend: jira" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based MCP
//! clients can connect directly.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Request, State},
    http::{HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::backends::{build_backends, default_factories, Backend, BackendFactory};
use crate::config::Config;
use crate::context::{bearer_token, combine, ContextExtractor, ContextPipeline};
use crate::identity::{IdentityExtractor, JwtVerifier};
use crate::mcp::McpBridge;
use crate::traits::{ToolInfo, ToolRegistry};

/// Shared state for the non-MCP routes.
#[derive(Clone)]
struct AppState {
    tools: Arc<HashMap<String, Arc<ToolRegistry>>>,
}

/// Starts the server with every built-in backend the config enables.
///
/// Runs until Ctrl-C or SIGTERM, then drains in-flight requests for at most
/// `server.shutdown_grace_secs` before closing backend resources.
pub async fn run_server(config: &Config) -> Result<()> {
    run_server_with_factories(config, &default_factories()).await
}

/// Like [`run_server`], with an explicit backend list.
pub async fn run_server_with_factories(
    config: &Config,
    factories: &[Box<dyn BackendFactory>],
) -> Result<()> {
    let backends = build_backends(config, factories).await?;
    if backends.is_empty() {
        tracing::warn!("no backends configured; only /health will respond");
    }
    let pipeline = build_pipeline(config).await?;
    let app = router(&backends, pipeline);

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", bind_addr))?;
    for backend in &backends {
        tracing::info!(
            endpoint = %format!("http://{}/{}", bind_addr, backend.name),
            tools = backend.tools.len(),
            "serving backend"
        );
    }
    tracing::info!(bind = %bind_addr, "MCP server listening");

    let token = CancellationToken::new();
    let stop = token.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            close_backends(&backends).await;
            joined.context("server task failed")?.context("HTTP server error")?;
            return Ok(());
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining requests");
        }
    }

    token.cancel();
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => {
            joined.context("server task failed")?.context("HTTP server error")?;
        }
        Err(_) => {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "grace period elapsed, dropping in-flight requests"
            );
            server.abort();
        }
    }
    close_backends(&backends).await;
    tracing::info!("server stopped");
    Ok(())
}

async fn close_backends(backends: &[Backend]) {
    for backend in backends {
        backend.close().await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Builds the context pipeline: the bearer token, then the verified identity
/// when `[identity]` is configured.
pub async fn build_pipeline(config: &Config) -> Result<ContextPipeline> {
    let mut stages: Vec<Arc<dyn ContextExtractor>> = vec![Arc::new(bearer_token)];
    if let Some(identity) = &config.identity {
        let header = HeaderName::try_from(identity.header.as_str())
            .with_context(|| format!("invalid identity header name: {}", identity.header))?;
        let verifier = JwtVerifier::from_config(identity)
            .await
            .context("Failed to initialise identity verifier")?;
        tracing::info!(header = %header, "identity assertions enabled");
        stages.push(Arc::new(IdentityExtractor::new(header, Arc::new(verifier))));
    }
    Ok(combine(stages))
}

/// Assembles the HTTP application for `backends`.
pub fn router(backends: &[Backend], pipeline: ContextPipeline) -> Router {
    let state = AppState {
        tools: Arc::new(
            backends
                .iter()
                .map(|b| (b.name.clone(), b.tools.clone()))
                .collect(),
        ),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(handle_health))
        .route("/{backend}/tools", get(handle_list_tools));

    for backend in backends {
        app = app.route_service(&format!("/{}", backend.name), mcp_service(backend));
    }

    app.with_state(state)
        .layer(middleware::from_fn_with_state(
            Arc::new(pipeline),
            attach_context,
        ))
        .layer(cors)
}

fn mcp_service(backend: &Backend) -> StreamableHttpService<McpBridge, LocalSessionManager> {
    let bridge = McpBridge::new(backend);
    let config = StreamableHttpServerConfig {
        stateful_mode: false,
        ..Default::default()
    };
    StreamableHttpService::new(
        move || Ok(bridge.clone()),
        Arc::new(LocalSessionManager::default()),
        config,
    )
}

/// Runs the context pipeline and stores its result in the request extensions.
async fn attach_context(
    State(pipeline): State<Arc<ContextPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let ctx = pipeline.apply(&parts);
    tracing::debug!(
        path = %parts.uri.path(),
        token = ctx.token().is_some(),
        identity = ctx.identity().is_some(),
        "request context"
    );
    parts.extensions.insert(ctx);
    next.run(Request::from_parts(parts, body)).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /{backend}/tools ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(
    State(state): State<AppState>,
    Path(backend): Path<String>,
) -> Result<Json<ToolListResponse>, AppError> {
    let tools = state
        .tools
        .get(&backend)
        .ok_or_else(|| not_found(format!("unknown backend: {}", backend)))?;
    Ok(Json(ToolListResponse {
        tools: tools.infos(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::context::RequestContext;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_pipeline_without_identity_has_one_stage() {
        let config = parse_config("[server]\nbind = \"127.0.0.1:0\"\n").unwrap();
        assert_eq!(build_pipeline(&config).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_with_shared_secret() {
        let config = parse_config(
            "[server]\nbind = \"127.0.0.1:0\"\n[identity]\nshared_secret = \"s3cret\"\n",
        )
        .unwrap();
        assert_eq!(build_pipeline(&config).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_middleware_inserts_context() {
        let app = Router::new()
            .route(
                "/probe",
                get(|request: HttpRequest<Body>| async move {
                    let ctx = request.extensions().get::<RequestContext>().cloned();
                    ctx.and_then(|c| c.token().map(str::to_string))
                        .unwrap_or_else(|| "none".to_string())
                }),
            )
            .layer(middleware::from_fn_with_state(
                Arc::new(combine(vec![Arc::new(bearer_token) as Arc<dyn ContextExtractor>])),
                attach_context,
            ));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/probe")
                    .header("authorization", "Bearer secret_abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"secret_abc");
    }

    #[tokio::test]
    async fn test_unknown_backend_tools_is_404() {
        let app = router(&[], ContextPipeline::default());
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/jira/tools")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "not_found");
    }
}
