//! Gateway HTTP server: wires the axum `StreamableHttpService` to
//! [`crate::handler::GatewayHandler`] and exposes a couple of
//! gateway-management endpoints (`/health`, OAuth completion) the
//! inbound MCP protocol itself has no room for.

mod startup;
mod state;

pub use startup::bootstrap;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handler::GatewayHandler;
use crate::session_context::session_context_middleware;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 3800, enable_cors: true }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port).parse().expect("invalid gateway bind address")
    }
}

pub struct GatewayServer {
    config: ServerConfig,
    state: AppState,
}

impl GatewayServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    fn build_router(&self) -> Router {
        let handler = GatewayHandler::new(Arc::clone(&self.state.router), {
            Arc::new(crate::meta_tools::LazyMetaToolLayer::new(
                Arc::clone(&self.state.router),
                Arc::clone(&self.state.cache),
            ))
        });

        let mcp_service = StreamableHttpService::new(
            move || Ok(handler.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: Some(std::time::Duration::from_secs(30)),
                sse_retry: Some(std::time::Duration::from_secs(3)),
                cancellation_token: CancellationToken::new(),
            },
        );

        let mcp_routes = Router::new()
            .nest_service("/mcp", mcp_service)
            .layer(middleware::from_fn(session_context_middleware));

        let mut router = Router::new()
            .route("/health", get(health))
            .route("/servers/{name}/oauth/complete", post(complete_oauth))
            .with_state(self.state.clone())
            .merge(mcp_routes)
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
            );
        }

        router
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.addr();
        info!(%addr, cors = self.config.enable_cors, "starting mxgate gateway");
        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;
        Ok(())
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.fleet.ready_servers().len();
    let total = state.fleet.get_all().len();
    Json(serde_json::json!({
        "status": "ok",
        "servers_ready": ready,
        "servers_total": total,
        "sessions": state.router.session_count(),
    }))
}

#[derive(Debug, Deserialize)]
struct CompleteOAuthBody {
    auth_code: String,
}

/// Implements the gateway's side of `completeOAuthAndReconnect`: an
/// external OAuth flow hands back an auth code out-of-band (there is no
/// MCP verb for this), and this endpoint stores it and retries the
/// connection for the named server.
async fn complete_oauth(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<CompleteOAuthBody>,
) -> impl IntoResponse {
    match state.fleet.complete_oauth_and_reconnect(&name, body.auth_code).await {
        Ok(()) => Json(serde_json::json!({ "status": "reconnecting" })).into_response(),
        Err(e) => {
            warn!(server = %name, "oauth completion failed: {e}");
            (axum::http::StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": e }))).into_response()
        }
    }
}
