use std::{sync::Arc, time::Duration};

use {overmsg_config::SessionsConfig, overmsg_identity::IdentityStore};

use crate::{registry::SessionRegistry, router::MessageRouter};

// ── Settings ─────────────────────────────────────────────────────────────────

/// Session timing resolved from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub handshake_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionsConfig::default())
    }
}

impl From<&SessionsConfig> for SessionSettings {
    fn from(cfg: &SessionsConfig) -> Self {
        Self {
            idle_timeout: cfg.idle_timeout(),
            sweep_interval: cfg.sweep_interval(),
            handshake_timeout: cfg.handshake_timeout(),
            write_timeout: cfg.write_timeout(),
        }
    }
}

// ── Relay state ──────────────────────────────────────────────────────────────

/// Shared relay runtime state, wrapped in Arc for use across tasks.
pub struct RelayState {
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    /// Durable identities.
    pub identities: Arc<dyn IdentityStore>,
    /// Delivery path from API calls onto live connections.
    pub router: MessageRouter,
    pub settings: SessionSettings,
    /// Server version string.
    pub version: String,
}

impl RelayState {
    pub fn new(identities: Arc<dyn IdentityStore>, settings: SessionSettings) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let router = MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&identities),
            settings.write_timeout,
        );
        Arc::new(Self {
            registry,
            identities,
            router,
            settings,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}
