use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Declarative configuration for a single outbound MCP server.
///
/// Parsed from the `mcpServers` / `mcpTemplates` map of the config file
/// and handed to the fleet as the unit of reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Not present in the config file itself; filled in by the loader
    /// from the `mcpServers`/`mcpTemplates` map key after parsing.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub disabled: bool,

    #[serde(flatten)]
    pub transport: TransportSpec,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl ServerSpec {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Discriminated transport configuration. A server is either reached by
/// spawning a child process speaking stdio framing, or by an HTTP-like
/// endpoint (streamable HTTP or SSE).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransportSpec {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        cwd: Option<String>,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        /// Use Server-Sent Events framing instead of streamable HTTP.
        #[serde(default)]
        sse: bool,
    },
}

impl TransportSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Http { sse: false, .. } => "http",
            Self::Http { sse: true, .. } => "sse",
        }
    }
}

/// Restart behavior applied when an outbound connection drops or fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl RestartPolicy {
    /// Exponential backoff for the given zero-based attempt number, capped
    /// at `backoff_max_ms`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(16);
        let scaled = self.backoff_base_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(scaled.min(self.backoff_max_ms))
    }
}
