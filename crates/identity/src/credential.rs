//! Salted one-way credential hashing (argon2id, PHC string format).

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential hashing failed: {0}")]
    Hash(password_hash::Error),
    #[error("stored credential hash is malformed: {0}")]
    MalformedHash(password_hash::Error),
}

pub fn hash_credential(credential: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(credential.as_bytes(), &salt)
        .map_err(CredentialError::Hash)?;
    Ok(hash.to_string())
}

/// Returns `Ok(false)` on a mismatch; errors only for unusable hashes.
pub fn verify_credential(credential: &str, phc_hash: &str) -> Result<bool, CredentialError> {
    let parsed = PasswordHash::new(phc_hash).map_err(CredentialError::MalformedHash)?;
    match Argon2::default().verify_password(credential.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CredentialError::Hash(e)),
    }
}
