//! Streamable-HTTP and SSE transport for MCP servers reached over the
//! network.
//!
//! OAuth provider flows themselves are out of scope here; this only
//! implements the *gate*: an unauthenticated connect attempt that fails
//! with a 401/`WWW-Authenticate`-shaped error is surfaced as
//! `OAuthRequired`, and an externally supplied bearer token (obtained
//! via `completeOAuthAndReconnect`) is injected as a plain
//! `Authorization` header on the retry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::transport::sse_client::SseClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::{new_client_handler, Transport, TransportConnectResult};

pub struct HttpTransport {
    server_name: String,
    url: String,
    headers: HashMap<String, String>,
    sse: bool,
    auth_token: Option<String>,
    connect_timeout: Duration,
    events: broadcast::Sender<mxgate_core::DomainEvent>,
}

impl HttpTransport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server_name: String,
        url: String,
        headers: HashMap<String, String>,
        sse: bool,
        auth_token: Option<String>,
        connect_timeout: Duration,
        events: broadcast::Sender<mxgate_core::DomainEvent>,
    ) -> Self {
        Self {
            server_name,
            url,
            headers,
            sse,
            auth_token,
            connect_timeout,
            events,
        }
    }

    fn requires_oauth(error_str: &str) -> bool {
        let lower = error_str.to_lowercase();
        ["401", "unauthorized", "www-authenticate", "invalid_token", "bearer"]
            .iter()
            .any(|s| lower.contains(s))
    }

    fn build_client(&self) -> Result<reqwest::Client, String> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (k, v) in &self.headers {
            let name = reqwest::header::HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| format!("invalid header name '{k}': {e}"))?;
            let value = reqwest::header::HeaderValue::from_str(v)
                .map_err(|e| format!("invalid header value for '{k}': {e}"))?;
            header_map.insert(name, value);
        }
        if let Some(token) = &self.auth_token {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| format!("invalid bearer token: {e}"))?;
            header_map.insert(reqwest::header::AUTHORIZATION, value);
        }
        reqwest::Client::builder()
            .default_headers(header_map)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))
    }

    async fn connect_streamable(&self, client: reqwest::Client) -> TransportConnectResult {
        let config = StreamableHttpClientTransportConfig::with_uri(self.url.as_str());
        let transport = StreamableHttpClientTransport::with_client(client, config);
        let handler = new_client_handler(&self.server_name, self.events.clone());
        let connect_future = handler.serve(transport);
        self.await_connect(connect_future).await
    }

    async fn connect_sse(&self, client: reqwest::Client) -> TransportConnectResult {
        match SseClientTransport::start_with_client(client, self.url.clone().into()).await {
            Ok(transport) => {
                let handler = new_client_handler(&self.server_name, self.events.clone());
                let connect_future = handler.serve(transport);
                self.await_connect(connect_future).await
            }
            Err(e) => {
                let err_str = format!("{e:#}");
                if Self::requires_oauth(&err_str) {
                    TransportConnectResult::OAuthRequired { auth_url: Some(self.url.clone()) }
                } else {
                    TransportConnectResult::Failed(format!("SSE connection failed: {e}"))
                }
            }
        }
    }

    async fn await_connect<F, E>(&self, connect_future: F) -> TransportConnectResult
    where
        F: std::future::Future<Output = Result<crate::client::McpClient, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.connect_timeout, connect_future).await {
            Ok(Ok(client)) => {
                let tools = client
                    .list_all_tools()
                    .await
                    .map(|v| v.into_iter().map(|t| t.name.to_string()).collect())
                    .unwrap_or_default();
                let prompts = client
                    .list_all_prompts()
                    .await
                    .map(|v| v.into_iter().map(|p| p.name).collect())
                    .unwrap_or_default();
                let resources = client
                    .list_all_resources()
                    .await
                    .map(|v| v.into_iter().map(|r| r.uri.to_string()).collect())
                    .unwrap_or_default();
                info!(server = %self.server_name, "http server connected");
                TransportConnectResult::Connected { client, tools, prompts, resources }
            }
            Ok(Err(e)) => {
                let err_str = format!("{e:#}");
                if Self::requires_oauth(&err_str) {
                    info!(server = %self.server_name, "server requires OAuth");
                    TransportConnectResult::OAuthRequired { auth_url: Some(self.url.clone()) }
                } else {
                    error!(server = %self.server_name, "connection failed: {err_str}");
                    TransportConnectResult::Failed(format!("HTTP connection failed: {e}"))
                }
            }
            Err(_) => TransportConnectResult::Failed(format!(
                "connection timeout ({:?})",
                self.connect_timeout
            )),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> TransportConnectResult {
        info!(server = %self.server_name, url = %self.url, "connecting http server");

        if let Err(e) = url::Url::parse(&self.url) {
            return TransportConnectResult::Failed(format!("invalid URL: {e}"));
        }

        let client = match self.build_client() {
            Ok(c) => c,
            Err(e) => return TransportConnectResult::Failed(e),
        };

        debug!(server = %self.server_name, sse = self.sse, "dispatching to transport variant");
        if self.sse {
            self.connect_sse(client).await
        } else {
            self.connect_streamable(client).await
        }
    }

    fn transport_type(&self) -> &'static str {
        if self.sse {
            "sse"
        } else {
            "http"
        }
    }

    fn description(&self) -> String {
        format!("{}:{}", self.transport_type(), self.url)
    }
}
