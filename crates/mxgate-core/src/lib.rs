//! Domain types, config parsing, and external-store contracts shared by
//! the outbound fleet and the inbound gateway.
//!
//! - `domain` - server specs, connection status, sessions, tag queries,
//!   presets, the typed event stream, and error kinds.
//! - `config` - JSON config parsing, `${NAME}` env substitution, and the
//!   pure validation function applied on load and on every reload.
//! - `store` - traits for the persistent session store and preset
//!   store, owned by the embedding application, plus in-memory
//!   reference implementations.

pub mod config;
pub mod domain;
pub mod store;

pub use domain::*;
