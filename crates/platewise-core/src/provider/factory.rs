//! Builds provider adapters from configuration.

use super::adapter::{resolve_env_var, DispatchSettings, ProviderAdapter};
use super::anthropic::AnthropicAdapter;
use super::hyperbolic::HyperbolicAdapter;
use super::ollama::OllamaAdapter;
use super::openai::OpenAiAdapter;
use crate::clock::SharedClock;
use crate::config::{Config, DispatchConfig};
use crate::error::ConfigError;
use crate::health::{HealthPolicy, HealthTracker};
use std::sync::Arc;

/// Every provider name the factory knows how to build.
pub const PROVIDER_NAMES: [&str; 4] = ["anthropic", "openai", "hyperbolic", "ollama"];

/// Factory for creating provider adapters from config.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create one adapter by name.
    ///
    /// An unconfigured section falls back to its defaults. Cloud providers
    /// fail when their API key does not resolve.
    pub fn create(
        provider: &str,
        config: &Config,
        clock: SharedClock,
    ) -> Result<Arc<dyn ProviderAdapter>, ConfigError> {
        let policy = HealthPolicy::from(&config.health);
        let tracker = || HealthTracker::with_clock(policy, clock.clone());
        let providers = &config.providers;

        let adapter: Arc<dyn ProviderAdapter> = match provider {
            "anthropic" => {
                let cfg = providers.anthropic.clone().unwrap_or_default();
                let api_key = require_key(&cfg.api_key, "Anthropic", "ANTHROPIC_API_KEY")?;
                Arc::new(
                    AnthropicAdapter::new(&api_key, &cfg.model, settings(&cfg.dispatch), tracker())
                        .with_endpoint(&cfg.endpoint),
                )
            }
            "openai" => {
                let cfg = providers.openai.clone().unwrap_or_default();
                let api_key = require_key(&cfg.api_key, "OpenAI", "OPENAI_API_KEY")?;
                Arc::new(
                    OpenAiAdapter::new(&api_key, &cfg.model, settings(&cfg.dispatch), tracker())
                        .with_endpoint(&cfg.endpoint),
                )
            }
            "hyperbolic" => {
                let cfg = providers.hyperbolic.clone().unwrap_or_default();
                let api_key = require_key(&cfg.api_key, "Hyperbolic", "HYPERBOLIC_API_KEY")?;
                Arc::new(HyperbolicAdapter::new(
                    &cfg.endpoint,
                    &api_key,
                    &cfg.model,
                    settings(&cfg.dispatch),
                    tracker(),
                ))
            }
            "ollama" => {
                let cfg = providers.ollama.clone().unwrap_or_default();
                Arc::new(OllamaAdapter::new(
                    &cfg.endpoint,
                    &cfg.model,
                    settings(&cfg.dispatch),
                    tracker(),
                ))
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown provider: {other}"
                )))
            }
        };
        Ok(adapter)
    }

    /// Create every configured, enabled provider.
    ///
    /// Providers that cannot be built (usually a missing API key) are logged
    /// and left out so the remaining ones can still serve requests.
    pub fn build_all(config: &Config, clock: SharedClock) -> Vec<Arc<dyn ProviderAdapter>> {
        let mut adapters = Vec::new();
        for name in PROVIDER_NAMES {
            let Some(dispatch) = config.providers.dispatch(name) else {
                continue;
            };
            if !dispatch.enabled {
                tracing::debug!("Provider {name} is disabled");
                continue;
            }
            match Self::create(name, config, clock.clone()) {
                Ok(adapter) => adapters.push(adapter),
                Err(e) => tracing::warn!("Skipping provider {name}: {e}"),
            }
        }
        adapters
    }
}

fn settings(dispatch: &DispatchConfig) -> DispatchSettings {
    DispatchSettings::from(dispatch)
}

fn require_key(value: &str, label: &str, env_var: &str) -> Result<String, ConfigError> {
    resolve_env_var(value).ok_or_else(|| {
        ConfigError::ValidationError(format!(
            "{label} API key not set. Set {env_var} env var."
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use crate::config::{AnthropicConfig, OllamaConfig, OpenAiConfig, ProvidersConfig};

    fn config_with(providers: ProvidersConfig) -> Config {
        Config {
            providers,
            ..Config::default()
        }
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let result = ProviderFactory::create("nope", &Config::default(), system_clock());
        assert!(matches!(result, Err(ConfigError::ValidationError(msg)) if msg.contains("nope")));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let mut config = Config::default();
        config.providers.anthropic = Some(AnthropicConfig {
            api_key: "${PLATEWISE_TEST_UNSET_KEY_A1}".to_string(),
            ..AnthropicConfig::default()
        });
        let result = ProviderFactory::create("anthropic", &config, system_clock());
        assert!(result.is_err());
    }

    #[test]
    fn test_build_all_skips_unbuildable_and_disabled() {
        let mut ollama = OllamaConfig::default();
        ollama.dispatch.priority = 4;
        let mut openai = OpenAiConfig {
            api_key: "sk-test".to_string(),
            ..OpenAiConfig::default()
        };
        openai.dispatch.enabled = false;

        let config = config_with(ProvidersConfig {
            anthropic: Some(AnthropicConfig {
                api_key: "${PLATEWISE_TEST_UNSET_KEY_B2}".to_string(),
                ..AnthropicConfig::default()
            }),
            openai: Some(openai),
            hyperbolic: None,
            ollama: Some(ollama),
        });

        let adapters = ProviderFactory::build_all(&config, system_clock());
        let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["ollama"]);
        assert_eq!(adapters[0].priority(), 4);
    }

    #[test]
    fn test_literal_key_builds_adapter_with_configured_settings() {
        let mut anthropic = AnthropicConfig {
            api_key: "sk-ant-test".to_string(),
            ..AnthropicConfig::default()
        };
        anthropic.dispatch.max_retries = 3;
        anthropic.dispatch.timeout_ms = 5_000;
        let config = config_with(ProvidersConfig {
            anthropic: Some(anthropic),
            openai: None,
            hyperbolic: None,
            ollama: None,
        });

        let adapter = ProviderFactory::create("anthropic", &config, system_clock()).unwrap();
        assert_eq!(adapter.name(), "anthropic");
        assert_eq!(adapter.max_retries(), 3);
        assert_eq!(adapter.timeout(), std::time::Duration::from_secs(5));
        assert_eq!(adapter.health().policy().min_requests, 5);
    }
}
