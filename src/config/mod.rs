//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.
//!
//! ```yaml
//! repository:
//!   publish_events: true
//! snapshots:
//!   frequency: 50
//!   read: true
//!   write: true
//! storage:
//!   type: memory
//! ```
//!
//! Or via environment:
//! - `REHYDRATE__SNAPSHOTS__FREQUENCY=50`
//! - `REHYDRATE__REPOSITORY__PUBLISH_EVENTS=false`

use serde::Deserialize;

use crate::storage::StorageConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "REHYDRATE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "REHYDRATE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "REHYDRATE_LOG";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Repository configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Publish committed events to the configured publisher. Default: true.
    pub publish_events: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            publish_events: true,
        }
    }
}

/// Snapshot configuration.
///
/// `read` and `write` exist for troubleshooting: disabling reads forces full
/// replay, disabling writes stops new snapshots without touching old ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Events between snapshots. Unset disables snapshotting.
    pub frequency: Option<u64>,
    /// Restore from snapshots. Default: true.
    pub read: bool,
    /// Write snapshots. Default: true.
    pub write: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            frequency: None,
            read: true,
            write: true,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repository configuration.
    pub repository: RepositoryConfig,
    /// Snapshot configuration.
    pub snapshots: SnapshotConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would silently misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshots.frequency == Some(0) {
            return Err(ConfigError::Invalid(
                "snapshots.frequency must be positive; leave it unset to disable snapshots"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}
