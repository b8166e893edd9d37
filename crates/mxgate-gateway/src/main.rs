//! mxgate gateway process entrypoint: loads a config file, connects the
//! configured MCP servers, and serves the multiplexed MCP surface over
//! streamable HTTP.

use std::path::PathBuf;

use mxgate_core::store::memory::{shared_preset_store, shared_session_store};
use mxgate_gateway::server::{bootstrap, GatewayServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MXGATE_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("mxgate.config.json"));

    let host = std::env::var("MXGATE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("MXGATE_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(3800);

    let ready = bootstrap(config_path, shared_session_store(), shared_preset_store()).await?;

    tracing::info!(path = ?ready.reload_pipeline.config_path(), "config reload pipeline active");

    let server = GatewayServer::new(ServerConfig { host, port, enable_cors: true }, ready.state);
    server.run().await
}
