use std::time::{SystemTime, UNIX_EPOCH};

use {async_trait::async_trait, uuid::Uuid};

/// A registered identity. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    /// argon2 PHC string; never the plaintext credential.
    pub credential_hash: String,
    pub token: Uuid,
    pub created_at: u64,
}

impl Identity {
    /// Build a new identity with a freshly generated random token.
    pub fn new(name: impl Into<String>, credential_hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential_hash: credential_hash.into(),
            token: Uuid::new_v4(),
            created_at: now_ms(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("name is already taken")]
    NameTaken,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt identity record: {0}")]
    Corrupt(String),
}

/// Durable identity records consumed by the relay core.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert a new identity. Fails with [`StoreError::NameTaken`] when the
    /// name already exists; uniqueness is enforced by the store itself.
    async fn insert(&self, identity: &Identity) -> Result<(), StoreError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_by_token(&self, token: &Uuid) -> Result<Option<Identity>, StoreError>;

    async fn name_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.find_by_name(name).await?.is_some())
    }

    /// Short backend label for logs and health output.
    fn backend(&self) -> &'static str;
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
