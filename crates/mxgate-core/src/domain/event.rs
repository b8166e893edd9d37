use serde::{Deserialize, Serialize};

/// Outbound connection lifecycle state, exposed on `OutboundClient` and
/// carried on `DomainEvent::ServerStatusChanged`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Connecting,
    Ready,
    AwaitingAuth,
    Error,
    Stopped,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::AwaitingAuth => "awaiting_auth",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn needs_auth(&self) -> bool {
        matches!(self, Self::AwaitingAuth)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Prompt,
    Resource,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Prompt => "prompt",
            Self::Resource => "resource",
        }
    }
}

/// Names discovered on a single outbound server after (re)connect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveredCapabilities {
    pub tools: Vec<String>,
    pub prompts: Vec<String>,
    pub resources: Vec<String>,
}

impl DiscoveredCapabilities {
    pub fn total_count(&self) -> usize {
        self.tools.len() + self.prompts.len() + self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }
}

/// Typed event stream tying the client fleet, capability cache, config
/// reload pipeline and session router together. Replaces ad hoc
/// callbacks: every cross-component notification is a variant here,
/// published on a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A server spec was added by a config reload.
    ServerAdded { server_name: String },

    /// A server spec was removed by a config reload.
    ServerRemoved { server_name: String },

    /// A server spec changed on reload. `fields` names every top-level
    /// field that differs from the previous spec (e.g. `["args"]`,
    /// `["tags"]`). The fleet applies the update in place only when
    /// `fields` is exactly `["tags"]`; any other change, including a
    /// `disabled` flip, restarts the outbound connection.
    ServerModified {
        server_name: String,
        fields: Vec<String>,
    },

    /// Outbound connection state machine transition.
    ServerStatusChanged {
        server_name: String,
        status: ConnectionStatus,
        flow_id: u64,
        message: Option<String>,
    },

    /// The server reached `AwaitingAuth`; `auth_url` is set when the
    /// upstream transport surfaced one.
    AuthRequired {
        server_name: String,
        auth_url: Option<String>,
    },

    /// Tools/prompts/resources were (re)discovered after connect or a
    /// backend-originated list_changed notification.
    CapabilitiesRefreshed {
        server_name: String,
        capabilities: DiscoveredCapabilities,
    },

    /// Pass-through of a backend's own list_changed notification, before
    /// the cache has re-fetched the list.
    UpstreamListChanged {
        server_name: String,
        kind: CapabilityKind,
    },

    /// A preset's tag query changed; sessions resolved against it must
    /// recompute their visible server set.
    PresetChanged { preset_name: String },

    SessionConnected { session_id: String },
    SessionDisconnected { session_id: String },
}

impl DomainEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ServerAdded { .. } => "server_added",
            Self::ServerRemoved { .. } => "server_removed",
            Self::ServerModified { .. } => "server_modified",
            Self::ServerStatusChanged { .. } => "server_status_changed",
            Self::AuthRequired { .. } => "auth_required",
            Self::CapabilitiesRefreshed { .. } => "capabilities_refreshed",
            Self::UpstreamListChanged { .. } => "upstream_list_changed",
            Self::PresetChanged { .. } => "preset_changed",
            Self::SessionConnected { .. } => "session_connected",
            Self::SessionDisconnected { .. } => "session_disconnected",
        }
    }

    /// Whether a session's view of tools/prompts/resources may need to
    /// change in response to this event, used to decide whether to send
    /// `list_changed` notifications to inbound clients.
    pub fn affects_capabilities(&self) -> bool {
        matches!(
            self,
            Self::ServerAdded { .. }
                | Self::ServerRemoved { .. }
                | Self::ServerModified { .. }
                | Self::CapabilitiesRefreshed { .. }
                | Self::UpstreamListChanged { .. }
                | Self::PresetChanged { .. }
                | Self::ServerStatusChanged {
                    status: ConnectionStatus::Ready,
                    ..
                }
                | Self::ServerStatusChanged {
                    status: ConnectionStatus::Stopped,
                    ..
                }
        )
    }
}
