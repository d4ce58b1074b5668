use {tracing::debug, uuid::Uuid};

use {
    overmsg_identity::{Identity, IdentityStore, hash_credential, verify_credential},
    overmsg_protocol::ReasonCode,
};

use crate::error::RelayError;

// ── Tokens ───────────────────────────────────────────────────────────────────

/// Parse a bearer token as sent in the `Auth-Token` header.
pub fn parse_bearer(raw: Option<&str>) -> Result<Uuid, ReasonCode> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ReasonCode::MissingToken);
    }
    Uuid::parse_str(raw).map_err(|_| ReasonCode::TokenInvalid)
}

// ── Credentials ──────────────────────────────────────────────────────────────

/// Hash a credential on the blocking pool; argon2 is deliberately slow.
pub async fn hash_blocking(credential: &str) -> Result<String, RelayError> {
    let credential = credential.to_string();
    let hash = tokio::task::spawn_blocking(move || hash_credential(&credential)).await??;
    Ok(hash)
}

/// Look up `name` and check `credential` against its stored hash.
pub async fn check_credentials(
    identities: &dyn IdentityStore,
    name: &str,
    credential: &str,
) -> Result<Identity, RelayError> {
    let Some(identity) = identities.find_by_name(name).await? else {
        return Err(ReasonCode::UnknownName.into());
    };
    let credential = credential.to_string();
    let hash = identity.credential_hash.clone();
    let matches =
        tokio::task::spawn_blocking(move || verify_credential(&credential, &hash)).await??;
    if !matches {
        debug!(name, "credential mismatch");
        return Err(ReasonCode::WrongCredential.into());
    }
    Ok(identity)
}
