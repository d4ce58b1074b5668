//! The five operations the relay exposes to its API boundary.

use {tracing::info, uuid::Uuid};

use {
    overmsg_identity::{Identity, validate_credential, validate_name},
    overmsg_protocol::{CloseReason, ReasonCode},
};

use crate::{
    auth::{check_credentials, hash_blocking},
    error::RelayError,
    state::RelayState,
};

impl RelayState {
    /// Register a new identity and return its freshly minted token.
    pub async fn create_identity(&self, name: &str, credential: &str) -> Result<Uuid, RelayError> {
        let name = name.trim();
        validate_name(name)?;
        validate_credential(credential)?;

        // Cheap pre-check; the store's uniqueness constraint still decides races.
        if self.identities.name_exists(name).await? {
            return Err(ReasonCode::NameTaken.into());
        }
        let hash = hash_blocking(credential).await?;
        let identity = Identity::new(name, hash);
        self.identities.insert(&identity).await?;
        info!(name, "identity created");
        Ok(identity.token)
    }

    /// Exchange a name and credential for the identity's token.
    pub async fn authenticate(&self, name: &str, credential: &str) -> Result<Uuid, RelayError> {
        let identity = check_credentials(self.identities.as_ref(), name.trim(), credential).await?;
        Ok(identity.token)
    }

    pub async fn send_message(
        &self,
        sender: &Uuid,
        recipient: &str,
        body: &str,
    ) -> Result<(), RelayError> {
        self.router.deliver(sender, recipient.trim(), body).await
    }

    /// Close the live session held by `token`.
    pub async fn disconnect(&self, token: &Uuid) -> Result<(), RelayError> {
        self.registry
            .remove(token, CloseReason::ApiDisconnect)
            .await
            .map(|_| ())
            .ok_or_else(|| ReasonCode::SessionNotFound.into())
    }

    pub async fn is_online(&self, name: &str) -> bool {
        self.registry.is_online(name.trim()).await
    }
}
