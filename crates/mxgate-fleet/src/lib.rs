//! Outbound side of the gateway: owns every connection to a configured
//! MCP server.
//!
//! - [`client`] — C2, the per-server connection state machine.
//! - [`transport`] — C1, stdio/streamable-HTTP/SSE connect strategies.
//! - [`fleet`] — C3, the set of outbound clients and config reconciliation.
//! - [`cache`] — C4, the LRU+TTL capability cache backing the lazy meta-tool layer.
//! - [`reload`] — C7, the debounced config file watcher.
//! - [`template_pool`] — C8, refcounted shared template instances.
//! - [`template_registry`] — the declared template definitions C8 instantiates from.

pub mod cache;
pub mod client;
pub mod fleet;
pub mod reload;
pub mod template_pool;
pub mod template_registry;
pub mod transport;

pub use cache::{CapabilityCache, CapabilityEntry, CapabilityKey, CacheStats};
pub use client::{McpClient, OutboundClient};
pub use fleet::ClientFleet;
pub use reload::ConfigReloadPipeline;
pub use template_pool::{TemplateInstanceHandle, TemplateInstancePool};
pub use template_registry::{TemplateDef, TemplateRegistry};
pub use transport::{config_hash, Transport, TransportConnectResult, TransportFactory};
