//! Configuration management for the tally sync system.
//!
//! Configuration is loaded once from a YAML file and injected at
//! construction time; nothing polls for late changes at runtime.

pub mod config;

pub use config::{
    CloudConfig, ConfigError, DatabaseConfig, SyncConfig, TallyConfig, load_config, save_config,
};
