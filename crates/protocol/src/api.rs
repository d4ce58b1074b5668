//! HTTP API request and response records.

use {
    secrecy::SecretString,
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

use crate::errors::ReasonCode;

/// Body of `POST /register` and `POST /token`.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub name: String,
    pub pass: SecretString,
}

/// Body of `POST /send_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub peer_name: String,
    pub message: String,
}

/// Body of `POST /is_online`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRequest {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResult {
    pub token: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceResult {
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ReasonCode,
    pub message: String,
}

/// Envelope wrapping every JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer<T> {
    pub success: bool,
    pub error: Option<ErrorBody>,
    pub result: Option<T>,
}

impl<T> Answer<T> {
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            error: None,
            result: Some(result),
        }
    }

    pub fn err(code: ReasonCode) -> Self {
        Self {
            success: false,
            error: Some(ErrorBody {
                code,
                message: code.message().to_string(),
            }),
            result: None,
        }
    }
}

impl Answer<()> {
    /// A successful answer with no result payload.
    pub fn done() -> Self {
        Self {
            success: true,
            error: None,
            result: None,
        }
    }
}
