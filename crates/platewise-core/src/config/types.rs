//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached analyses before LRU eviction
    pub max_entries: usize,

    /// Maximum age of an entry in seconds, measured from insertion
    pub ttl_secs: u64,

    /// Persist the cache to disk across restarts
    pub persist: bool,

    /// Location of the cache file
    pub path: String,

    /// Interval between background expiry sweeps in seconds
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl_secs: 24 * 60 * 60,
            persist: true,
            path: "~/.platewise/cache/analysis.json".to_string(),
            cleanup_interval_secs: 60 * 60,
        }
    }
}

/// Provider availability policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// A provider whose lifetime error rate reaches this value is skipped
    pub max_error_rate: f64,

    /// Requests needed before the error-rate gate applies
    pub min_requests: u64,

    /// Cooldown after a rate-limit error when the backend gives no hint
    pub rate_limit_cooldown_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_error_rate: 0.8,
            min_requests: 5,
            rate_limit_cooldown_secs: 60,
        }
    }
}

/// Failover loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base delay before retrying the same provider, doubled per attempt
    pub retry_delay_ms: u64,

    /// Default total budget per request; 0 disables the deadline
    pub request_deadline_ms: u64,

    /// Maximum tokens the model may generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Interval between out-of-band provider health checks in seconds
    pub health_check_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 500,
            request_deadline_ms: 0,
            max_tokens: 1024,
            temperature: 0.2,
            health_check_interval_secs: 300,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Dispatch settings shared by every provider section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Whether the provider takes part in failover
    pub enabled: bool,

    /// Lower numbers are tried first
    pub priority: u32,

    /// Extra attempts on the same provider for retryable failures
    pub max_retries: u32,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 100,
            max_retries: 1,
            timeout_ms: 60_000,
        }
    }
}

impl DispatchConfig {
    fn with_priority(priority: u32) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}

/// Provider configurations. A `None` section is not configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Anthropic configuration
    pub anthropic: Option<AnthropicConfig>,

    /// OpenAI configuration
    pub openai: Option<OpenAiConfig>,

    /// Hyperbolic (OpenAI-compatible cloud) configuration
    pub hyperbolic: Option<HyperbolicConfig>,

    /// Ollama (local) configuration
    pub ollama: Option<OllamaConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            anthropic: Some(AnthropicConfig::default()),
            openai: Some(OpenAiConfig::default()),
            hyperbolic: None,
            ollama: None,
        }
    }
}

impl ProvidersConfig {
    /// Dispatch settings of a configured provider section.
    pub fn dispatch(&self, name: &str) -> Option<&DispatchConfig> {
        match name {
            "anthropic" => self.anthropic.as_ref().map(|c| &c.dispatch),
            "openai" => self.openai.as_ref().map(|c| &c.dispatch),
            "hyperbolic" => self.hyperbolic.as_ref().map(|c| &c.dispatch),
            "ollama" => self.ollama.as_ref().map(|c| &c.dispatch),
            _ => None,
        }
    }
}

/// Anthropic configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    #[serde(flatten)]
    pub dispatch: DispatchConfig,

    /// API base URL
    pub endpoint: String,

    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Model name
    pub model: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::with_priority(1),
            endpoint: "https://api.anthropic.com/v1".to_string(),
            api_key: "${ANTHROPIC_API_KEY}".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
        }
    }
}

/// OpenAI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    #[serde(flatten)]
    pub dispatch: DispatchConfig,

    /// API base URL
    pub endpoint: String,

    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Model name
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::with_priority(2),
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: "${OPENAI_API_KEY}".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Hyperbolic configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperbolicConfig {
    #[serde(flatten)]
    pub dispatch: DispatchConfig,

    /// API endpoint
    pub endpoint: String,

    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Model name
    pub model: String,
}

impl Default for HyperbolicConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::with_priority(3),
            endpoint: "https://api.hyperbolic.xyz/v1".to_string(),
            api_key: "${HYPERBOLIC_API_KEY}".to_string(),
            model: "meta-llama/Llama-3.2-11B-Vision-Instruct".to_string(),
        }
    }
}

/// Ollama configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    #[serde(flatten)]
    pub dispatch: DispatchConfig,

    /// Ollama API endpoint
    pub endpoint: String,

    /// Model name
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            // Vision models running locally can be slow
            dispatch: DispatchConfig {
                priority: 10,
                timeout_ms: 120_000,
                ..DispatchConfig::default()
            },
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2-vision".to_string(),
        }
    }
}
