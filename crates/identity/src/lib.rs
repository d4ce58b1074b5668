//! Identity storage: name → credential hash → bearer token.
//!
//! Identities are created once and never mutated. The token doubles as the
//! secret presented in the transport handshake, so lookups by token are on
//! the hot path and lookups by name serve registration and routing.

pub mod credential;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod validation;

pub use {
    credential::{CredentialError, hash_credential, verify_credential},
    memory::MemoryIdentityStore,
    sqlite::SqliteIdentityStore,
    store::{Identity, IdentityStore, StoreError},
    validation::{validate_credential, validate_name},
};
