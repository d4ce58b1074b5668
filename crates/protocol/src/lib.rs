//! Wire types shared by the relay gateway and its clients.
//!
//! Two surfaces live here:
//! - the line-delimited TCP transport (handshake replies, control lines,
//!   JSON push frames), and
//! - the JSON request/response records of the HTTP API.

pub mod api;
pub mod errors;
pub mod frames;
pub mod handshake;

pub use {
    api::{
        Answer, CredentialsRequest, ErrorBody, PresenceRequest, PresenceResult, SendMessageRequest,
        TokenResult,
    },
    errors::{ErrorKind, ReasonCode},
    frames::{CloseReason, PushFrame},
    handshake::HandshakeReply,
};

/// Transport protocol revision, reported by `/health`.
pub const PROTOCOL_VERSION: u32 = 2;

/// Maximum message body length, in Unicode scalar values.
pub const MAX_BODY_CHARS: usize = 1024;

/// Identity name bounds, in Unicode scalar values.
pub const MIN_NAME_CHARS: usize = 4;
pub const MAX_NAME_CHARS: usize = 32;

/// Credentials must be shorter than this many scalar values.
pub const MAX_CREDENTIAL_CHARS: usize = 31;

/// Every character an identity name may contain.
pub const ALLOWED_NAME_SYMBOLS: &str =
    "QWERTYUIOPASDFGHJKLZXCVBNMqwertyuiopasdfghjklzxcvbnm0123456789_-";

/// Upper bound for a single line read from a transport connection.
pub const MAX_LINE_BYTES: usize = 4096;

/// HTTP header carrying the bearer token.
pub const AUTH_TOKEN_HEADER: &str = "Auth-Token";

/// Control lines recognised on an active connection.
pub mod control {
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const DISCONNECT: &str = "disconnect";
}
