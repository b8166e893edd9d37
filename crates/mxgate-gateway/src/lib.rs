//! mxgate gateway: the inbound side of the multiplexer.
//!
//! - [`session_context`] — parses `tags=`/`preset=`/`tagQuery=` query
//!   params and the `mcp-session-id` header into an `InboundSession`.
//! - [`router`] — C5, per-session visibility filtering and qualified-name routing.
//! - [`preset_resolver`] — C9, the sync-readable preset cache backing `preset=` filtering.
//! - [`meta_tools`] — C6, the lazy `tool_list`/`tool_schema`/`tool_invoke` surface.
//! - [`handler`] — the `rmcp::ServerHandler` bridging the above to the wire.
//! - [`server`] — axum wiring, bootstrap, and the process entrypoint's `run()`.

pub mod handler;
pub mod meta_tools;
pub mod preset_resolver;
pub mod router;
pub mod server;
pub mod session_context;

pub use handler::GatewayHandler;
pub use meta_tools::LazyMetaToolLayer;
pub use preset_resolver::PresetResolver;
pub use router::SessionRouter;
pub use server::{AppState, GatewayServer, ServerConfig};
