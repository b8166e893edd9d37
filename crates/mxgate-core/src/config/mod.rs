//! Config file parsing, env substitution, and the pure validation
//! function used both at initial load and on every debounced reload.

mod env_subst;
mod loader;
mod validate;

pub use env_subst::{referenced_tokens, substitute};
pub use loader::{instantiate_template, GatewayConfig, RawGatewayConfig};
pub use validate::{validate_server_spec, validate_template_spec, ValidationIssue};
