//! Best-effort delivery of one message onto a recipient's live connection.

use std::{sync::Arc, time::Duration};

use {
    tracing::{debug, warn},
    uuid::Uuid,
};

use {
    overmsg_identity::IdentityStore,
    overmsg_protocol::{CloseReason, MAX_BODY_CHARS, PushFrame, ReasonCode},
};

use crate::{error::RelayError, registry::SessionRegistry};

pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    identities: Arc<dyn IdentityStore>,
    write_timeout: Duration,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        identities: Arc<dyn IdentityStore>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            identities,
            write_timeout,
        }
    }

    /// Deliver `body` from the session holding `sender` to `recipient`.
    ///
    /// Attempted exactly once. A failed write tears the recipient's session
    /// down before the error is returned.
    pub async fn deliver(
        &self,
        sender: &Uuid,
        recipient: &str,
        body: &str,
    ) -> Result<(), RelayError> {
        let Some(from) = self.registry.lookup_by_token(sender).await else {
            return Err(ReasonCode::SenderUnauthenticated.into());
        };
        validate_message(recipient, body)?;

        if !self.identities.name_exists(recipient).await? {
            return Err(ReasonCode::RecipientUnknown.into());
        }

        let line = PushFrame::message(&from.display_name, recipient, body).to_line()?;
        let Some(pending) = self.registry.push(recipient, line).await else {
            return Err(ReasonCode::RecipientOffline.into());
        };

        let failure = match tokio::time::timeout(self.write_timeout, pending.done).await {
            Ok(Ok(Ok(()))) => {
                debug!(from = %from.display_name, to = recipient, "message delivered");
                return Ok(());
            },
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(_)) => "connection task gone".to_string(),
            Err(_) => format!("write timed out after {:?}", self.write_timeout),
        };
        warn!(to = recipient, conn_id = %pending.conn_id, error = %failure, "delivery failed");
        self.registry
            .release(&pending.token, pending.conn_id, CloseReason::WriteFailed)
            .await;
        Err(ReasonCode::DeliveryFailed.into())
    }
}

/// Field checks shared by the router and its callers.
pub fn validate_message(recipient: &str, body: &str) -> Result<(), ReasonCode> {
    if recipient.trim().is_empty() {
        return Err(ReasonCode::RecipientEmpty);
    }
    if body.trim().is_empty() {
        return Err(ReasonCode::BodyEmpty);
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(ReasonCode::BodyTooLong);
    }
    Ok(())
}
