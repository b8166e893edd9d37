use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TagQuery;

/// How an inbound session selects which outbound servers are visible to
/// it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TagFilterMode {
    /// No filtering: the full union of connected servers is visible.
    None,
    /// `tags=a,b` query param; visible if a server has any of the tags.
    SimpleOr,
    /// `preset=name`; resolved against the preset store.
    Preset,
    /// A full [`TagQuery`] boolean tree supplied by the client.
    Advanced,
}

/// State the router keeps per inbound MCP client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundSession {
    pub session_id: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub tag_filter_mode: TagFilterMode,

    #[serde(default)]
    pub preset_name: Option<String>,

    #[serde(default)]
    pub tag_query: Option<TagQuery>,

    #[serde(default)]
    pub enable_pagination: bool,

    /// Opaque client-supplied context (e.g. client name/version), carried
    /// through for logging and for the persistent session store.
    #[serde(default)]
    pub context: Value,

    pub connected_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl InboundSession {
    pub fn new(session_id: String, tag_filter_mode: TagFilterMode) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            tags: Vec::new(),
            tag_filter_mode,
            preset_name: None,
            tag_query: None,
            enable_pagination: false,
            context: Value::Null,
            connected_at: now,
            last_accessed_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}
