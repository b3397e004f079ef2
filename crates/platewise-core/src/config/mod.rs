//! Configuration management for Platewise.
//!
//! Configuration is loaded from a TOML file in the platform config directory,
//! falling back to defaults for anything not specified.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure for Platewise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Result cache settings
    pub cache: CacheConfig,

    /// Provider availability policy
    pub health: HealthConfig,

    /// Failover loop settings
    pub gateway: GatewayConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Provider settings
    pub providers: ProvidersConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.platewise.platewise/config.toml
    /// - Linux: ~/.config/platewise/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\platewise\config\config.toml
    ///
    /// Falls back to ~/.platewise/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "platewise", "platewise")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".platewise").join("config.toml")
            })
    }

    /// Get the resolved cache file path (with ~ expansion).
    pub fn cache_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.cache.path);
        PathBuf::from(expanded.into_owned())
    }

    /// Default request deadline, if one is configured.
    pub fn request_deadline(&self) -> Option<Duration> {
        match self.gateway.request_deadline_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
