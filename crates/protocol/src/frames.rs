use serde::{Deserialize, Serialize};

/// Why the server closed a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    ClientDisconnect,
    ApiDisconnect,
    IdleTimeout,
    TransportError,
    WriteFailed,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientDisconnect => "client_disconnect",
            Self::ApiDisconnect => "api_disconnect",
            Self::IdleTimeout => "idle_timeout",
            Self::TransportError => "transport_error",
            Self::WriteFailed => "write_failed",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JSON line pushed by the server onto an active connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushFrame {
    Message { from: String, to: String, body: String },
    Closed { reason: CloseReason },
}

impl PushFrame {
    pub fn message(from: impl Into<String>, to: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Message {
            from: from.into(),
            to: to.into(),
            body: body.into(),
        }
    }

    /// Serialize to a single line, without the trailing newline.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
