use {
    overmsg_identity::{CredentialError, StoreError},
    overmsg_protocol::{ErrorKind, ReasonCode},
};

/// Failure of a relay operation.
///
/// `Rejected` carries a stable reason code for the caller. Every other
/// variant is an internal failure: logged server-side and reported to the
/// caller only as `internal_error`.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{}", .0.message())]
    Rejected(ReasonCode),
    #[error("identity store: {0}")]
    Store(StoreError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RelayError {
    /// The code reported to the caller.
    pub fn reason(&self) -> ReasonCode {
        match self {
            Self::Rejected(code) => *code,
            _ => ReasonCode::InternalError,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.reason().kind() == ErrorKind::Internal
    }
}

impl From<ReasonCode> for RelayError {
    fn from(code: ReasonCode) -> Self {
        Self::Rejected(code)
    }
}

impl From<StoreError> for RelayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NameTaken => Self::Rejected(ReasonCode::NameTaken),
            other => Self::Store(other),
        }
    }
}
