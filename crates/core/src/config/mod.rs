//! Configuration for framejack
//!
//! A single TOML file controls logging verbosity and the bootstrap retry
//! policy:
//!
//! ```toml
//! version = 1
//! debug = false
//!
//! [bootstrap]
//! grace_period_ms = 100
//! retry_interval_ms = 250
//! max_attempts = 8
//! ```
//!
//! Every key is optional. A missing file means defaults; nothing is written
//! into the host's directory unless [`CoreConfig::save`] is called.

mod loader;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use loader::{core_config_path, host_base_dir, CONFIG_ENV, CONFIG_FILE_NAME};

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Could not determine the host executable's directory
    #[error("Config directory not available - could not resolve host executable path")]
    NoConfigDirectory,
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Bootstrap timing and retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Delay before the first extraction attempt
    pub grace_period_ms: u64,

    /// Delay between failed attempts
    pub retry_interval_ms: u64,

    /// Attempts before the bootstrap is abandoned (at least one is always made)
    pub max_attempts: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 100,
            retry_interval_ms: 250,
            max_attempts: 8,
        }
    }
}

impl BootstrapConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Attempt budget, never zero
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Policy with no waiting, used when the caller already knows the
    /// device exists
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            grace_period_ms: 0,
            retry_interval_ms: 0,
            max_attempts,
        }
    }
}

/// Core framework configuration.
///
/// Loaded from [`core_config_path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Config version for future migration support
    pub version: u32,

    /// Enable debug logging
    pub debug: bool,

    /// Bootstrap retry policy
    pub bootstrap: BootstrapConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            version: 1,
            debug: false,
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load core config from file, falling back to defaults if missing.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&core_config_path()?)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::debug!("Loaded core config from {:?}", path);
            Ok(config)
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Load, logging and discarding any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save core config to file.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&core_config_path()?)
    }

    /// Save to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved core config to {:?}", path);
        Ok(())
    }

    /// Reload core config from file.
    pub fn reload(&mut self) -> ConfigResult<()> {
        let path = core_config_path()?;
        let content = std::fs::read_to_string(&path)?;
        *self = toml::from_str(&content)?;
        tracing::debug!("Reloaded core config from {:?}", path);
        Ok(())
    }
}
