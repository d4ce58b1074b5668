//! Gateway: the relay's session registry, transport listener and HTTP API.
//!
//! Lifecycle:
//! 1. Load + validate config, open the identity store
//! 2. Bind the HTTP API and the line-delimited transport listener
//! 3. Start the idle sweep
//! 4. Serve until Ctrl-C, then close every live session
//!
//! The registry is the only shared mutable state; everything else reaches
//! live connections through it.

pub mod api;
pub mod auth;
pub mod connection;
pub mod error;
pub mod http;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;
pub mod sweep;

pub use {
    error::RelayError,
    registry::SessionRegistry,
    server::{open_identity_store, serve_tcp, start_relay},
    state::{RelayState, SessionSettings},
};
