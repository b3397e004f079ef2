//! Command implementations.

pub mod analyze;
pub mod cache;
pub mod config;
pub mod providers;

use platewise_core::{Config, ConfigError};
use std::path::{Path, PathBuf};

/// Resolve the config file location: `--config` (with `~` expanded) or the platform default.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => expand_path(path),
        None => Config::default_path(),
    }
}

/// Load config from `path`, falling back to defaults when the file doesn't exist.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        Config::load_from(path)
    } else {
        Ok(Config::default())
    }
}

/// Expand a leading `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}
