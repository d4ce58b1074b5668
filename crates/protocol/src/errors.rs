use serde::{Deserialize, Serialize};

/// Coarse failure class of a [`ReasonCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Unauthenticated,
    Unavailable,
    Internal,
}

/// Stable reason codes returned to API callers.
///
/// The serialized names are part of the public contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    // validation
    InvalidJson,
    UnsupportedContentType,
    NameTooShort,
    NameTooLong,
    NameDisallowedCharacters,
    NameLeadingUnderscore,
    CredentialInvalid,
    CredentialTooLong,
    RecipientEmpty,
    BodyEmpty,
    BodyTooLong,
    TokenInvalid,
    // conflict
    NameTaken,
    // not found
    UnknownName,
    RecipientUnknown,
    SessionNotFound,
    // unauthenticated
    MissingToken,
    WrongCredential,
    SenderUnauthenticated,
    // unavailable
    RecipientOffline,
    // transport / storage
    DeliveryFailed,
    InternalError,
}

impl ReasonCode {
    pub fn kind(self) -> ErrorKind {
        use ReasonCode::*;
        match self {
            InvalidJson
            | UnsupportedContentType
            | NameTooShort
            | NameTooLong
            | NameDisallowedCharacters
            | NameLeadingUnderscore
            | CredentialInvalid
            | CredentialTooLong
            | RecipientEmpty
            | BodyEmpty
            | BodyTooLong
            | TokenInvalid => ErrorKind::Validation,
            NameTaken => ErrorKind::Conflict,
            UnknownName | RecipientUnknown | SessionNotFound => ErrorKind::NotFound,
            MissingToken | WrongCredential | SenderUnauthenticated => ErrorKind::Unauthenticated,
            RecipientOffline => ErrorKind::Unavailable,
            DeliveryFailed | InternalError => ErrorKind::Internal,
        }
    }

    /// Human-readable message sent alongside the code.
    pub fn message(self) -> &'static str {
        use ReasonCode::*;
        match self {
            InvalidJson => "invalid JSON data",
            UnsupportedContentType => "unsupported Content-Type",
            NameTooShort => "too short name",
            NameTooLong => "too long name",
            NameDisallowedCharacters => "name contains not-allowed symbols, see GET /allowed_syms",
            NameLeadingUnderscore => "name shouldn't start with _",
            CredentialInvalid => "pass should be longer",
            CredentialTooLong => "pass is too long",
            RecipientEmpty => "empty peer_name",
            BodyEmpty => "empty message",
            BodyTooLong => "too long message",
            TokenInvalid => "Auth-Token is not valid",
            NameTaken => "found users with this name",
            UnknownName => "found no user with this name",
            RecipientUnknown => "user with this name not found",
            SessionNotFound => "connection with this token not found",
            MissingToken => "got no Auth-Token",
            WrongCredential => "wrong password",
            SenderUnauthenticated => "sender has no live connection",
            RecipientOffline => "user is offline",
            DeliveryFailed => "message delivery failed",
            InternalError => "server-side error",
        }
    }
}
