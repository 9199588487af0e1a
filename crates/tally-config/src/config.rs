//! Configuration types and loading.
//!
//! The main entry point is [`TallyConfig`], the contents of `tally.yaml`.
//! Loaded with [`load_config`] and saved with [`save_config`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

/// Local database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the on-disk SQLite file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Cloud store endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Base URL of the cloud store, e.g. `https://api.example.com/v1`.
    #[serde(default)]
    pub base_url: String,

    /// Optional bearer token sent on every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Global request timeout in seconds. A hung network call fails after
    /// this long instead of holding the sync lock forever.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether the interval scheduler starts with the engine.
    #[serde(default)]
    pub auto_sync: bool,

    /// Auto-sync period in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Whether to attempt one best-effort sync pass at engine construction
    /// (after migrations). Failure is logged and swallowed.
    #[serde(default = "default_true")]
    pub initial_sync: bool,
}

/// Top-level configuration for the tally sync system.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_db_path() -> String {
    "tally.db".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: false,
            interval_secs: default_interval_secs(),
            initial_sync: true,
        }
    }
}

impl CloudConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SyncConfig {
    /// Auto-sync period as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Loads configuration from a YAML file. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<TallyConfig> {
    if !path.exists() {
        return Ok(TallyConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    let config: TallyConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Saves configuration to a YAML file.
pub fn save_config(path: &Path, config: &TallyConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config(&tmp.path().join("tally.yaml")).unwrap();
        assert_eq!(cfg, TallyConfig::default());
        assert_eq!(cfg.cloud.timeout_secs, 10);
        assert_eq!(cfg.sync.interval_secs, 30);
        assert!(cfg.sync.initial_sync);
    }

    #[test]
    fn round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tally.yaml");

        let mut cfg = TallyConfig::default();
        cfg.cloud.base_url = "https://api.example.com/v1".into();
        cfg.cloud.api_token = Some("secret".into());
        cfg.sync.auto_sync = true;
        cfg.sync.interval_secs = 5;

        save_config(&path, &cfg).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "cloud:\n  base_url: https://api.example.com\n";
        let cfg: TallyConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.cloud.base_url, "https://api.example.com");
        assert_eq!(cfg.cloud.timeout_secs, 10);
        assert_eq!(cfg.database.path, "tally.db");
    }
}
