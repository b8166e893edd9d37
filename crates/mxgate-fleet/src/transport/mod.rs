//! Transport abstraction for outbound MCP connections (C1).
//!
//! A `Transport` is a one-shot connect attempt for a single
//! `ServerSpec`. New transports can be added without touching the fleet
//! or the client state machine.

mod http;
mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use async_trait::async_trait;
use mxgate_core::{ServerSpec, TransportSpec};
use tokio::sync::broadcast;

use crate::client::McpClient;

/// Outcome of one connection attempt.
pub enum TransportConnectResult {
    Connected {
        client: McpClient,
        tools: Vec<String>,
        prompts: Vec<String>,
        resources: Vec<String>,
    },
    OAuthRequired { auth_url: Option<String> },
    Failed(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> TransportConnectResult;
    fn transport_type(&self) -> &'static str;
    fn description(&self) -> String;
}

/// Builds the `Transport` implementation for a spec, carrying along an
/// optional bearer token obtained out-of-band through the OAuth gate
/// (see `completeOAuthAndReconnect`) for HTTP-like transports.
pub struct TransportFactory;

impl TransportFactory {
    pub fn create(
        spec: &ServerSpec,
        auth_token: Option<String>,
        events: broadcast::Sender<mxgate_core::DomainEvent>,
    ) -> Box<dyn Transport> {
        match &spec.transport {
            TransportSpec::Stdio { command, args, env, cwd } => Box::new(StdioTransport::new(
                spec.name.clone(),
                command.clone(),
                args.clone(),
                env.clone(),
                cwd.clone(),
                spec.connect_timeout(),
                events,
            )),
            TransportSpec::Http { url, headers, sse } => Box::new(HttpTransport::new(
                spec.name.clone(),
                url.clone(),
                headers.clone(),
                *sse,
                auth_token,
                spec.connect_timeout(),
                events,
            )),
        }
    }
}

/// Stable hash of the connection-relevant part of a spec, used by the
/// Template Instance Pool to key shared instances. Authorization headers
/// are excluded so a token refresh doesn't spuriously mint a new
/// instance.
pub fn config_hash(spec: &ServerSpec) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    match &spec.transport {
        TransportSpec::Stdio { command, args, env, cwd } => {
            "stdio".hash(&mut hasher);
            command.hash(&mut hasher);
            args.hash(&mut hasher);
            cwd.hash(&mut hasher);
            let mut pairs: Vec<_> = env.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            for (k, v) in pairs {
                k.hash(&mut hasher);
                v.hash(&mut hasher);
            }
        }
        TransportSpec::Http { url, headers, sse } => {
            "http".hash(&mut hasher);
            url.hash(&mut hasher);
            sse.hash(&mut hasher);
            let mut pairs: Vec<_> = headers.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            for (k, v) in pairs {
                if !k.eq_ignore_ascii_case("authorization") {
                    k.hash(&mut hasher);
                    v.hash(&mut hasher);
                }
            }
        }
    }
    hasher.finish()
}

pub fn new_client_handler(
    server_name: &str,
    events: broadcast::Sender<mxgate_core::DomainEvent>,
) -> crate::client::ClientEventForwarder {
    crate::client::ClientEventForwarder::new(server_name, events)
}
