//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::{Config, DispatchConfig};

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "cache.max_entries must be > 0".into(),
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.ttl_secs must be > 0".into(),
            ));
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.cleanup_interval_secs must be > 0".into(),
            ));
        }
        if self.cache.persist && self.cache.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "cache.path must be set when cache.persist is enabled".into(),
            ));
        }
        if !(self.health.max_error_rate > 0.0 && self.health.max_error_rate <= 1.0) {
            return Err(ConfigError::ValidationError(
                "health.max_error_rate must be in (0.0, 1.0]".into(),
            ));
        }
        if self.gateway.temperature < 0.0 || self.gateway.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "gateway.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.gateway.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_tokens must be > 0".into(),
            ));
        }

        for name in ["anthropic", "openai", "hyperbolic", "ollama"] {
            if let Some(dispatch) = self.providers.dispatch(name) {
                validate_dispatch(name, dispatch)?;
            }
        }
        Ok(())
    }
}

fn validate_dispatch(name: &str, dispatch: &DispatchConfig) -> Result<(), ConfigError> {
    if dispatch.timeout_ms == 0 {
        return Err(ConfigError::ValidationError(format!(
            "providers.{name}.timeout_ms must be > 0"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.cache.max_entries = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_entries"));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = Config::default();
        config.cache.ttl_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ttl_secs"));
    }

    #[test]
    fn test_validate_rejects_invalid_error_rate() {
        let mut config = Config::default();
        config.health.max_error_rate = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_error_rate"));

        config.health.max_error_rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_provider_timeout() {
        let mut config = Config::default();
        if let Some(openai) = config.providers.openai.as_mut() {
            openai.dispatch.timeout_ms = 0;
        }
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("providers.openai.timeout_ms"));
    }
}
