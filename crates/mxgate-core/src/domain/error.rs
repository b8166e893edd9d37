use thiserror::Error;

/// Gateway-wide error kinds.
///
/// These map onto the error kinds a client of the gateway observes
/// (tool call failures, config validation, meta-tool dispatch) rather
/// than low-level transport plumbing, which is wrapped into
/// [`GatewayError::Transport`].
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not permitted: {0}")]
    NotPermitted(String),

    #[error("not ready: {0}")]
    NotReady(String),

    #[error("authentication required for server '{server_name}'")]
    AuthRequired {
        server_name: String,
        auth_url: Option<String>,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream error: {0}")]
    Upstream(String),
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::NotPermitted(_) => "not_permitted",
            Self::NotReady(_) => "not_ready",
            Self::AuthRequired { .. } => "auth_required",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport_error",
            Self::Upstream(_) => "upstream",
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
