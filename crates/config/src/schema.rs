//! Config schema types (server listeners, identity storage, session timing).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OvermsgConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub sessions: SessionsConfig,
}

/// Listener addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface both listeners bind to.
    pub bind: String,
    /// Port of the HTTP API.
    pub http_port: u16,
    /// Port of the line-delimited transport.
    pub tcp_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            http_port: 4422,
            tcp_port: 4242,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Identity store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// sqlx connection URL; only read by the sqlite backend.
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let path = crate::loader::data_dir().join("overmsg.db");
        Self {
            backend: StorageBackend::default(),
            database_url: format!("sqlite://{}?mode=rwc", path.display()),
        }
    }
}

/// Session lifetime knobs, all in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub handshake_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 120,
            sweep_interval_secs: 10,
            handshake_timeout_secs: 30,
            write_timeout_secs: 5,
        }
    }
}

impl SessionsConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl OvermsgConfig {
    /// Reject configurations the relay cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.http_port == self.server.tcp_port {
            anyhow::bail!(
                "server.http_port equals server.tcp_port ({}); the listeners need distinct ports",
                self.server.http_port
            );
        }
        let s = &self.sessions;
        for (key, value) in [
            ("sessions.idle_timeout_secs", s.idle_timeout_secs),
            ("sessions.sweep_interval_secs", s.sweep_interval_secs),
            ("sessions.handshake_timeout_secs", s.handshake_timeout_secs),
            ("sessions.write_timeout_secs", s.write_timeout_secs),
        ] {
            if value == 0 {
                anyhow::bail!("{key} must be greater than zero");
            }
        }
        if self.storage.backend == StorageBackend::Sqlite && self.storage.database_url.is_empty() {
            anyhow::bail!("storage.database_url is empty");
        }
        Ok(())
    }
}
