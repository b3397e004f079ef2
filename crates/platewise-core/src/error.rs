//! Error types for the Platewise analysis gateway.
//!
//! Provider failures are reclassified into a small taxonomy ([`ErrorKind`])
//! so the gateway can decide whether to retry, fail over, or gate a backend
//! behind a cooldown. Everything the caller sees is a [`GatewayError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Backend is explicitly throttling; triggers a cooldown window.
    RateLimit,
    /// 5xx, overload, timeout or connection failure.
    ServerFault,
    /// Backend answered but produced no usable analysis (malformed output,
    /// rejected payload).
    AnalysisFault,
    /// Anything we could not place; treated conservatively.
    Unknown,
}

impl ErrorKind {
    /// Whether the gateway may retry immediately, on this or another backend.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::ServerFault)
    }

    /// Whether this failure counts toward the backend's error rate.
    ///
    /// An analysis fault means the backend was reachable and answered, so it
    /// says nothing about the backend's health.
    pub fn counts_against_health(self) -> bool {
        !matches!(self, ErrorKind::AnalysisFault)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ServerFault => "server_fault",
            ErrorKind::AnalysisFault => "analysis_fault",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure reported by a provider adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{provider} {kind}: {message}")]
pub struct ProviderError {
    /// Name of the adapter that produced the error
    pub provider: String,
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status code, when the failure came from an HTTP response
    pub status_code: Option<u16>,
    /// Backend-supplied hint for how long to back off
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
            status_code: None,
            retry_after: None,
        }
    }

    pub fn rate_limited(
        provider: impl Into<String>,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self {
            retry_after,
            ..Self::new(provider, ErrorKind::RateLimit, message)
        }
    }

    pub fn server_fault(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::ServerFault, message)
    }

    pub fn analysis(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::AnalysisFault, message)
    }

    pub fn unknown(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Unknown, message)
    }

    /// A call that exceeded its per-attempt timeout.
    pub fn timeout(provider: impl Into<String>, timeout: Duration) -> Self {
        Self::server_fault(
            provider,
            format!("timed out after {}ms", timeout.as_millis()),
        )
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind == ErrorKind::RateLimit
    }
}

/// What happened to a single provider while serving a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProviderOutcome {
    /// Not invoked because its health tracker reported it unavailable.
    Skipped { provider: String },
    /// Invoked and failed on every attempt it was given.
    Failed {
        provider: String,
        kind: ErrorKind,
        attempts: u32,
        message: String,
    },
    /// Still working when the caller's deadline ran out. Not held against
    /// the provider's health.
    Interrupted { provider: String, attempts: u32 },
}

impl ProviderOutcome {
    pub fn provider(&self) -> &str {
        match self {
            ProviderOutcome::Skipped { provider }
            | ProviderOutcome::Failed { provider, .. }
            | ProviderOutcome::Interrupted { provider, .. } => provider,
        }
    }
}

impl fmt::Display for ProviderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderOutcome::Skipped { provider } => write!(f, "{provider}: skipped (unavailable)"),
            ProviderOutcome::Failed {
                provider,
                kind,
                attempts,
                message,
            } => write!(f, "{provider}: {kind} after {attempts} attempt(s): {message}"),
            ProviderOutcome::Interrupted { provider, attempts } => {
                write!(f, "{provider}: interrupted by deadline on attempt {attempts}")
            }
        }
    }
}

fn describe_outcomes(outcomes: &[ProviderOutcome]) -> String {
    if outcomes.is_empty() {
        return "no providers attempted".to_string();
    }
    outcomes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_kind(kind: &Option<ErrorKind>) -> &'static str {
    match kind {
        Some(kind) => kind.as_str(),
        None => "none available",
    }
}

/// Top-level error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The gateway was built without any provider adapters
    #[error("No analysis providers configured")]
    NoProviders,

    /// Every provider was unavailable or failed
    #[error(
        "All analysis providers exhausted (last failure: {}): {}",
        describe_kind(.last_kind),
        describe_outcomes(.outcomes)
    )]
    Exhausted {
        last_kind: Option<ErrorKind>,
        outcomes: Vec<ProviderOutcome>,
    },

    /// The caller's deadline ran out before any provider succeeded
    #[error(
        "Request deadline of {deadline_ms}ms exceeded: {}",
        describe_outcomes(.outcomes)
    )]
    DeadlineExceeded {
        deadline_ms: u64,
        outcomes: Vec<ProviderOutcome>,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cache persistence errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// General I/O errors (reading input images)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Per-provider outcomes, when the error came out of the failover loop.
    pub fn outcomes(&self) -> &[ProviderOutcome] {
        match self {
            GatewayError::Exhausted { outcomes, .. }
            | GatewayError::DeadlineExceeded { outcomes, .. } => outcomes,
            _ => &[],
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result cache persistence errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to access cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode cache snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Convenience type alias for gateway results.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Convenience type alias for provider adapter results.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::ServerFault.is_retryable());
        assert!(!ErrorKind::AnalysisFault.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable_server_fault() {
        let err = ProviderError::timeout("openai", Duration::from_millis(1500));
        assert_eq!(err.kind, ErrorKind::ServerFault);
        assert!(err.retryable());
        assert!(err.message.contains("1500ms"));
    }

    #[test]
    fn test_rate_limited_carries_hint() {
        let err = ProviderError::rate_limited("anthropic", "slow down", Some(Duration::from_secs(30)))
            .with_status(429);
        assert!(err.is_rate_limit());
        assert_eq!(err.retry_after, Some(Duration::from_secs(30)));
        assert_eq!(err.status_code, Some(429));
    }

    #[test]
    fn test_exhausted_message_names_skipped_and_failed() {
        let err = GatewayError::Exhausted {
            last_kind: Some(ErrorKind::ServerFault),
            outcomes: vec![
                ProviderOutcome::Skipped {
                    provider: "anthropic".to_string(),
                },
                ProviderOutcome::Failed {
                    provider: "openai".to_string(),
                    kind: ErrorKind::ServerFault,
                    attempts: 2,
                    message: "HTTP 503".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("last failure: server_fault"));
        assert!(msg.contains("anthropic: skipped"));
        assert!(msg.contains("openai: server_fault after 2 attempt(s)"));
        assert_eq!(err.outcomes().len(), 2);
    }

    #[test]
    fn test_exhausted_without_attempts() {
        let err = GatewayError::Exhausted {
            last_kind: None,
            outcomes: vec![],
        };
        assert!(err.to_string().contains("none available"));
    }
}
