//! Relay configuration: schema, discovery, and loading.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, data_dir, discover_and_load, find_or_default_config_path,
        load_config, save_config, set_config_dir,
    },
    schema::{OvermsgConfig, ServerConfig, SessionsConfig, StorageBackend, StorageConfig},
};
