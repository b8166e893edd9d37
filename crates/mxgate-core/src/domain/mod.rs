//! Domain entities, value objects, and events for the gateway.
//!
//! These types model the wire-independent state the gateway reasons
//! about: server specs, outbound connection state, inbound sessions,
//! tag queries, presets, and the typed event stream that ties the
//! fleet to the session router.

mod error;
mod event;
mod preset;
mod server_spec;
mod session;
mod tag_query;

pub use error::{GatewayError, GatewayResult};
pub use event::{CapabilityKind, ConnectionStatus, DiscoveredCapabilities, DomainEvent};
pub use preset::{Preset, PresetStrategy};
pub use server_spec::{RestartPolicy, ServerSpec, TransportSpec};
pub use session::{InboundSession, TagFilterMode};
pub use tag_query::TagQuery;
