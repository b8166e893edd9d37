//! Outbound connection to a single configured MCP server (C2).
//!
//! An `OutboundClient` owns the state machine
//! `Pending -> Connecting -> Ready|AwaitingAuth|Error -> Stopped` for one
//! `ServerSpec`. It never shares its connection with another spec; the
//! fleet (C3) owns the map from server name to `OutboundClient`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mxgate_core::{CapabilityKind, ConnectionStatus, DiscoveredCapabilities, DomainEvent, ServerSpec};
use parking_lot::RwLock;
use rmcp::model::{ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::RoleClient;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// The live `rmcp` session for one outbound connection, regardless of
/// which transport produced it.
pub type McpClient = RunningService<RoleClient, ClientEventForwarder>;

/// `rmcp::ClientHandler` that turns backend-originated notifications
/// into `DomainEvent`s on the fleet's broadcast channel, so the
/// capability cache and session router learn about upstream changes
/// without polling.
#[derive(Clone)]
pub struct ClientEventForwarder {
    info: ClientInfo,
    server_name: String,
    events: broadcast::Sender<DomainEvent>,
}

impl ClientEventForwarder {
    pub fn new(server_name: &str, events: broadcast::Sender<DomainEvent>) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: format!("mxgate-{server_name}"),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("mxgate outbound client".to_string()),
                    icons: None,
                    website_url: None,
                    ..Default::default()
                },
                meta: None,
            },
            server_name: server_name.to_string(),
            events,
        }
    }

    fn emit_list_changed(&self, kind: CapabilityKind) {
        let event = DomainEvent::UpstreamListChanged {
            server_name: self.server_name.clone(),
            kind,
        };
        if self.events.send(event).is_err() {
            debug!(server = %self.server_name, "no subscribers for upstream list_changed");
        }
    }
}

impl rmcp::ClientHandler for ClientEventForwarder {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!(server = %self.server_name, "backend tools/list_changed");
            self.emit_list_changed(CapabilityKind::Tool);
        }
    }

    fn on_prompt_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!(server = %self.server_name, "backend prompts/list_changed");
            self.emit_list_changed(CapabilityKind::Prompt);
        }
    }

    fn on_resource_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!(server = %self.server_name, "backend resources/list_changed");
            self.emit_list_changed(CapabilityKind::Resource);
        }
    }

    fn on_logging_message(
        &self,
        params: rmcp::model::LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            let message = match &params.data {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            debug!(server = %self.server_name, logger = ?params.logger, "{message}");
        }
    }
}

/// Mutable runtime state behind an `OutboundClient`.
struct ClientState {
    status: ConnectionStatus,
    message: Option<String>,
    auth_url: Option<String>,
    capabilities: DiscoveredCapabilities,
    client: Option<McpClient>,
    connected_at: Option<Instant>,
    consecutive_failures: u32,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Pending,
            message: None,
            auth_url: None,
            capabilities: DiscoveredCapabilities::default(),
            client: None,
            connected_at: None,
            consecutive_failures: 0,
        }
    }
}

/// One outbound server's connection and the state machine governing it.
///
/// `flow_id` is a monotonic counter bumped on every state transition so
/// that a late-arriving async connect attempt (superseded by a newer
/// reconcile pass) can detect it is stale and discard its result instead
/// of clobbering newer state.
pub struct OutboundClient {
    pub spec: RwLock<Arc<ServerSpec>>,
    state: RwLock<ClientState>,
    flow_id: AtomicU64,
    events: broadcast::Sender<DomainEvent>,
}

impl OutboundClient {
    pub fn new(spec: Arc<ServerSpec>, events: broadcast::Sender<DomainEvent>) -> Self {
        Self {
            spec: RwLock::new(spec),
            state: RwLock::new(ClientState::default()),
            flow_id: AtomicU64::new(0),
            events,
        }
    }

    pub fn name(&self) -> String {
        self.spec.read().name.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.read().status
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ConnectionStatus::Ready
    }

    pub fn capabilities(&self) -> DiscoveredCapabilities {
        self.state.read().capabilities.clone()
    }

    pub fn current_flow_id(&self) -> u64 {
        self.flow_id.load(Ordering::SeqCst)
    }

    /// Bump the flow id and return the new value; the caller carries it
    /// through the in-flight connect attempt to detect staleness.
    pub fn begin_flow(&self) -> u64 {
        self.flow_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn transition(&self, flow_id: u64, status: ConnectionStatus, message: Option<String>) -> bool {
        if flow_id != self.current_flow_id() {
            debug!(server = %self.name(), flow_id, current = self.current_flow_id(), "ignoring stale transition");
            return false;
        }
        {
            let mut state = self.state.write();
            state.status = status;
            state.message = message.clone();
        }
        let _ = self.events.send(DomainEvent::ServerStatusChanged {
            server_name: self.name(),
            status,
            flow_id,
            message,
        });
        true
    }

    pub fn mark_connecting(&self, flow_id: u64) {
        self.transition(flow_id, ConnectionStatus::Connecting, None);
    }

    pub fn mark_ready(&self, flow_id: u64, client: McpClient, capabilities: DiscoveredCapabilities) {
        if !self.transition(flow_id, ConnectionStatus::Ready, None) {
            return;
        }
        let mut state = self.state.write();
        state.client = Some(client);
        state.capabilities = capabilities.clone();
        state.connected_at = Some(Instant::now());
        state.consecutive_failures = 0;
        state.auth_url = None;
        drop(state);
        let _ = self.events.send(DomainEvent::CapabilitiesRefreshed {
            server_name: self.name(),
            capabilities,
        });
    }

    pub fn mark_awaiting_auth(&self, flow_id: u64, auth_url: Option<String>) {
        if !self.transition(flow_id, ConnectionStatus::AwaitingAuth, auth_url.clone()) {
            return;
        }
        self.state.write().auth_url = auth_url.clone();
        let _ = self.events.send(DomainEvent::AuthRequired {
            server_name: self.name(),
            auth_url,
        });
    }

    pub fn mark_error(&self, flow_id: u64, message: String) {
        if !self.transition(flow_id, ConnectionStatus::Error, Some(message)) {
            return;
        }
        let mut state = self.state.write();
        state.consecutive_failures += 1;
        state.client = None;
    }

    pub fn mark_stopped(&self, flow_id: u64) {
        self.transition(flow_id, ConnectionStatus::Stopped, None);
        self.state.write().client = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.read().consecutive_failures
    }

    pub fn auth_url(&self) -> Option<String> {
        self.state.read().auth_url.clone()
    }

    /// Run a closure against the live client, if connected. This is the
    /// only way callers touch the underlying `rmcp` session, keeping the
    /// lock scope to the closure's body.
    pub fn with_client<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&McpClient) -> R,
    {
        let guard = self.state.read();
        guard.client.as_ref().map(f)
    }

    pub fn update_spec_in_place(&self, spec: Arc<ServerSpec>) {
        *self.spec.write() = spec;
    }

    /// Cheap handle to the live session's peer, for callers that need to
    /// make an upstream request (`call_tool`, `get_prompt`,
    /// `read_resource`) outside the state lock's scope.
    pub fn peer(&self) -> Option<rmcp::service::Peer<RoleClient>> {
        self.with_client(|c| c.peer())
    }
}
