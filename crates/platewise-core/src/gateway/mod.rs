//! Failover orchestration across providers.
//!
//! A request is served from the cache when possible. On a miss the gateway
//! walks the providers in ascending priority, skips the ones whose health
//! tracker reports them unavailable, retries retryable failures on the same
//! provider within its retry budget, and caches the first success.

mod monitor;

pub use monitor::HealthMonitor;

use crate::cache::{CacheOptions, CleanupTask, ResultCache};
use crate::clock::{system_clock, SharedClock};
use crate::config::Config;
use crate::error::{ConfigError, ErrorKind, GatewayError, ProviderError, ProviderOutcome, Result};
use crate::hash::ContentHasher;
use crate::health::ProviderHealth;
use crate::provider::{
    backoff_with_jitter, HealthCheck, PromptOptions, ProviderAdapter, ProviderFactory,
    ProviderRequest, ProviderResponse,
};
use crate::types::{AnalysisRequest, AnalysisResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Tunables for the failover loop.
#[derive(Debug, Clone, Copy)]
pub struct GatewayOptions {
    /// Base delay for exponential backoff between retries on one provider
    pub retry_delay: Duration,
    /// Deadline applied to requests that carry none of their own
    pub request_deadline: Option<Duration>,
    pub prompt: PromptOptions,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(500),
            request_deadline: None,
            prompt: PromptOptions::default(),
        }
    }
}

impl GatewayOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry_delay: Duration::from_millis(config.gateway.retry_delay_ms),
            request_deadline: config.request_deadline(),
            prompt: PromptOptions {
                max_tokens: config.gateway.max_tokens,
                temperature: config.gateway.temperature,
            },
        }
    }
}

/// A provider's place in the failover order and its current health.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub priority: u32,
    pub max_retries: u32,
    pub timeout_ms: u64,
    #[serde(flatten)]
    pub health: ProviderHealth,
}

/// How one provider's turn in the failover loop ended.
enum Turn {
    Succeeded(ProviderResponse),
    Failed(ProviderOutcome, ErrorKind),
    OutOfTime(Option<ProviderOutcome>),
}

/// Cache-first analysis gateway with ordered provider failover.
pub struct Gateway {
    cache: Arc<ResultCache>,
    providers: Vec<Arc<dyn ProviderAdapter>>,
    options: GatewayOptions,
    /// Background expiry sweep, stopped when the gateway is dropped
    cleanup: Option<CleanupTask>,
}

impl Gateway {
    /// Create a gateway over an explicit cache and provider set.
    ///
    /// Providers are ordered by ascending priority; ties keep the order given.
    pub fn new(
        cache: Arc<ResultCache>,
        mut providers: Vec<Arc<dyn ProviderAdapter>>,
        options: GatewayOptions,
    ) -> Self {
        providers.sort_by_key(|p| p.priority());
        Self {
            cache,
            providers,
            options,
            cleanup: None,
        }
    }

    /// Build the cache and every configured provider from config, and start
    /// the periodic cache sweep.
    ///
    /// Fails if no provider can be built and the cache is not persisted,
    /// since such a gateway could never serve anything.
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::from_config_with_clock(config, system_clock()).await
    }

    pub async fn from_config_with_clock(config: &Config, clock: SharedClock) -> Result<Self> {
        let providers = ProviderFactory::build_all(config, clock.clone());
        if providers.is_empty() {
            if !config.cache.persist {
                return Err(ConfigError::ValidationError(
                    "no analysis provider could be built and cache persistence is off".into(),
                )
                .into());
            }
            tracing::warn!("No analysis providers could be built; only cached results can be served");
        } else {
            let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
            tracing::debug!("Providers configured: {}", names.join(", "));
        }

        let cache_options = CacheOptions::from_config(config);
        let cleanup_interval = cache_options.cleanup_interval;
        let cache = ResultCache::open_with_clock(cache_options, clock).await;
        let gateway = Self::new(
            Arc::new(cache),
            providers,
            GatewayOptions::from_config(config),
        );
        Ok(match cleanup_interval {
            Some(interval) => gateway.with_cleanup(interval),
            None => gateway,
        })
    }

    /// Sweep expired cache entries every `interval` for as long as the
    /// gateway lives.
    pub fn with_cleanup(mut self, interval: Duration) -> Self {
        tracing::debug!("Cache sweep every {interval:?}");
        self.cleanup = Some(self.cache.spawn_cleanup(interval));
        self
    }

    /// Analyze one input.
    ///
    /// A cache hit returns without touching any provider. On a miss the
    /// result is cached only if some provider succeeds; a valid analysis with
    /// no foods is still a success.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        let started = Instant::now();
        let key = ContentHasher::hash_input(&request.input);
        let request_id = request.request_id.as_deref();

        if let Some(hit) = self.cache.get(&key, request_id).await {
            tracing::debug!("Serving {} from cache ({})", short(&key), hit.provider);
            return Ok(hit);
        }

        if self.providers.is_empty() {
            return Err(GatewayError::NoProviders);
        }

        let deadline = request.deadline.or(self.options.request_deadline);
        let deadline_at = deadline.map(|d| started + d);
        let mut provider_request = ProviderRequest::for_input(&request.input, self.options.prompt);
        let mut outcomes = Vec::new();
        let mut last_kind = None;

        for provider in &self.providers {
            if !provider.is_available() {
                tracing::debug!("Skipping unavailable provider {}", provider.name());
                outcomes.push(ProviderOutcome::Skipped {
                    provider: provider.name().to_string(),
                });
                continue;
            }

            match self
                .take_turn(provider.as_ref(), &mut provider_request, deadline_at)
                .await
            {
                Turn::Succeeded(response) => {
                    let result = AnalysisResult {
                        content_hash: key.clone(),
                        provider: provider.name().to_string(),
                        model: response.model,
                        data: response.data,
                        tokens_used: response.tokens_used,
                        latency_ms: response.latency_ms,
                        analyzed_at: self.cache.clock().now(),
                        request_id: None,
                        cached: false,
                    };
                    tracing::debug!(
                        "{} analyzed {} in {}ms ({} foods)",
                        result.provider,
                        short(&key),
                        result.latency_ms,
                        result.food_count()
                    );
                    self.cache.set(&key, result.clone()).await;
                    return Ok(result.with_overlay(request_id, false));
                }
                Turn::Failed(outcome, kind) => {
                    last_kind = Some(kind);
                    outcomes.push(outcome);
                }
                Turn::OutOfTime(outcome) => {
                    outcomes.extend(outcome);
                    tracing::warn!(
                        "Deadline exceeded for {} after {} provider(s)",
                        short(&key),
                        outcomes.len()
                    );
                    return Err(GatewayError::DeadlineExceeded {
                        deadline_ms: deadline.map_or(0, |d| d.as_millis() as u64),
                        outcomes,
                    });
                }
            }
        }

        tracing::warn!(
            "All providers exhausted for {} (last failure: {})",
            short(&key),
            last_kind.map_or("none available", ErrorKind::as_str)
        );
        Err(GatewayError::Exhausted {
            last_kind,
            outcomes,
        })
    }

    /// Invoke one provider, retrying retryable failures within its budget.
    ///
    /// Each attempt runs under the provider's own timeout. The caller's
    /// deadline is enforced outside the adapter, so an attempt cut short by
    /// it is dropped before the adapter records anything.
    async fn take_turn(
        &self,
        provider: &dyn ProviderAdapter,
        request: &mut ProviderRequest,
        deadline_at: Option<Instant>,
    ) -> Turn {
        let mut attempts = 0u32;
        let mut last_error: Option<ProviderError> = None;
        request.timeout = provider.timeout();

        loop {
            let left = remaining(deadline_at);
            if left.is_some_and(|l| l.is_zero()) {
                return Turn::OutOfTime(last_error.map(|e| failed(provider, attempts, e)));
            }
            attempts += 1;

            let outcome = match left {
                Some(left) => match tokio::time::timeout(left, provider.analyze(request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::debug!(
                            "Deadline reached while {} was on attempt {attempts}",
                            provider.name()
                        );
                        return Turn::OutOfTime(Some(ProviderOutcome::Interrupted {
                            provider: provider.name().to_string(),
                            attempts,
                        }));
                    }
                },
                None => provider.analyze(request).await,
            };
            let error = match outcome {
                Ok(response) => return Turn::Succeeded(response),
                Err(error) => error,
            };
            tracing::warn!(
                "{} attempt {attempts} failed: {}",
                provider.name(),
                error
            );

            let may_retry =
                error.retryable() && attempts <= provider.max_retries() && provider.is_available();
            if !may_retry {
                let kind = error.kind;
                return Turn::Failed(failed(provider, attempts, error), kind);
            }

            let mut delay = backoff_with_jitter(attempts - 1, self.options.retry_delay.as_millis() as u64);
            if let Some(left) = remaining(deadline_at) {
                delay = delay.min(left);
            }
            tracing::debug!(
                "Retrying {} after {delay:?} ({attempts}/{})",
                provider.name(),
                provider.max_retries()
            );
            last_error = Some(error);
            tokio::time::sleep(delay).await;
        }
    }

    /// Health of every provider in failover order.
    pub fn provider_health(&self) -> Vec<ProviderStatus> {
        self.providers
            .iter()
            .map(|p| ProviderStatus {
                name: p.name().to_string(),
                priority: p.priority(),
                max_retries: p.max_retries(),
                timeout_ms: p.timeout().as_millis() as u64,
                health: p.health().snapshot(),
            })
            .collect()
    }

    /// Run every provider's health check concurrently.
    pub async fn health_check_all(&self) -> Vec<HealthCheck> {
        futures_util::future::join_all(self.providers.iter().map(|p| p.health_check())).await
    }

    /// Start periodic out-of-band probing of every provider.
    pub fn spawn_health_monitor(&self, interval: Duration) -> HealthMonitor {
        HealthMonitor::spawn(self.providers.clone(), interval)
    }

    /// Whether a background cache sweep is running.
    pub fn is_sweeping(&self) -> bool {
        self.cleanup.is_some()
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Providers in failover order.
    pub fn providers(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.providers
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }
}

fn remaining(deadline_at: Option<Instant>) -> Option<Duration> {
    deadline_at.map(|at| at.saturating_duration_since(Instant::now()))
}

fn failed(provider: &dyn ProviderAdapter, attempts: u32, error: ProviderError) -> ProviderOutcome {
    ProviderOutcome::Failed {
        provider: provider.name().to_string(),
        kind: error.kind,
        attempts,
        message: error.message,
    }
}

fn short(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthTracker;
    use crate::provider::DispatchSettings;
    use crate::types::AnalysisInput;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Adapter that fails with `fail_kind` for its first `failures` calls.
    struct FlakyProvider {
        name: &'static str,
        settings: DispatchSettings,
        health: HealthTracker,
        failures: u32,
        fail_kind: ErrorKind,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(name: &'static str, priority: u32, failures: u32, fail_kind: ErrorKind) -> Self {
            Self {
                name,
                settings: DispatchSettings {
                    priority,
                    max_retries: 1,
                    timeout: Duration::from_secs(5),
                },
                health: HealthTracker::default(),
                failures,
                fail_kind,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for FlakyProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn settings(&self) -> &DispatchSettings {
            &self.settings
        }

        fn health(&self) -> &HealthTracker {
            &self.health
        }

        async fn analyze(
            &self,
            request: &ProviderRequest,
        ) -> crate::error::ProviderResult<ProviderResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let failures = self.failures;
            let kind = self.fail_kind;
            let name = self.name;
            crate::provider::tracked_call(name, &self.health, request.timeout, async move {
                if call < failures {
                    Err(ProviderError::new(name, kind, "scripted failure"))
                } else {
                    Ok(ProviderResponse {
                        data: json!({"foods": [{"name": "toast"}]}),
                        model: "flaky-1".to_string(),
                        tokens_used: Some(10),
                        latency_ms: 1,
                    })
                }
            })
            .await
        }

        async fn health_check(&self) -> HealthCheck {
            HealthCheck {
                provider: self.name.to_string(),
                healthy: true,
                latency_ms: 0,
                detail: None,
            }
        }
    }

    fn gateway(providers: Vec<Arc<dyn ProviderAdapter>>) -> Gateway {
        let options = GatewayOptions {
            retry_delay: Duration::from_millis(1),
            ..GatewayOptions::default()
        };
        Gateway::new(
            Arc::new(ResultCache::new(10, Duration::from_secs(3600))),
            providers,
            options,
        )
    }

    fn request(text: &str) -> AnalysisRequest {
        AnalysisRequest::new(AnalysisInput::text(text))
    }

    #[test]
    fn test_providers_sorted_by_priority_stable() {
        let a = Arc::new(FlakyProvider::new("a", 5, 0, ErrorKind::Unknown));
        let b = Arc::new(FlakyProvider::new("b", 1, 0, ErrorKind::Unknown));
        let c = Arc::new(FlakyProvider::new("c", 5, 0, ErrorKind::Unknown));
        let gw = gateway(vec![a, b, c]);
        let order: Vec<&str> = gw.providers().iter().map(|p| p.name()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_no_providers() {
        let gw = gateway(vec![]);
        let err = gw.analyze(request("soup")).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoProviders));
    }

    #[tokio::test]
    async fn test_retryable_failure_retries_same_provider() {
        let first = Arc::new(FlakyProvider::new("first", 1, 1, ErrorKind::ServerFault));
        let second = Arc::new(FlakyProvider::new("second", 2, 0, ErrorKind::Unknown));
        let gw = gateway(vec![first.clone(), second.clone()]);

        let result = gw.analyze(request("toast")).await.unwrap();
        assert_eq!(result.provider, "first");
        assert_eq!(first.calls(), 2);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_fails_over_immediately() {
        let first = Arc::new(FlakyProvider::new("first", 1, 1, ErrorKind::AnalysisFault));
        let second = Arc::new(FlakyProvider::new("second", 2, 0, ErrorKind::Unknown));
        let gw = gateway(vec![first.clone(), second.clone()]);

        let result = gw.analyze(request("toast")).await.unwrap();
        assert_eq!(result.provider, "second");
        assert_eq!(first.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_moves_on_without_retry() {
        let first = Arc::new(FlakyProvider::new("first", 1, 5, ErrorKind::RateLimit));
        let second = Arc::new(FlakyProvider::new("second", 2, 0, ErrorKind::Unknown));
        let gw = gateway(vec![first.clone(), second.clone()]);

        let result = gw.analyze(request("toast")).await.unwrap();
        assert_eq!(result.provider, "second");
        // Cooldown makes the provider unavailable, so the retry budget is not spent
        assert_eq!(first.calls(), 1);
        assert!(!first.is_available());
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_provider() {
        let first = Arc::new(FlakyProvider::new("first", 1, 9, ErrorKind::ServerFault));
        let second = Arc::new(FlakyProvider::new("second", 2, 9, ErrorKind::Unknown));
        let gw = gateway(vec![first.clone(), second.clone()]);

        let err = gw.analyze(request("toast")).await.unwrap_err();
        match &err {
            GatewayError::Exhausted {
                last_kind,
                outcomes,
            } => {
                assert_eq!(*last_kind, Some(ErrorKind::Unknown));
                assert_eq!(outcomes.len(), 2);
                assert!(matches!(
                    &outcomes[0],
                    ProviderOutcome::Failed { attempts: 2, kind: ErrorKind::ServerFault, .. }
                ));
                assert!(matches!(
                    &outcomes[1],
                    ProviderOutcome::Failed { attempts: 1, kind: ErrorKind::Unknown, .. }
                ));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(gw.cache().len().await, 0);
    }

    #[tokio::test]
    async fn test_request_id_overlay_and_cache_hit() {
        let only = Arc::new(FlakyProvider::new("only", 1, 0, ErrorKind::Unknown));
        let gw = gateway(vec![only.clone()]);

        let fresh = gw
            .analyze(request("two eggs").with_request_id("req-1"))
            .await
            .unwrap();
        assert_eq!(fresh.request_id.as_deref(), Some("req-1"));
        assert!(!fresh.cached);

        let hit = gw
            .analyze(request("Two   EGGS").with_request_id("req-2"))
            .await
            .unwrap();
        assert_eq!(hit.request_id.as_deref(), Some("req-2"));
        assert!(hit.cached);
        assert_eq!(hit.content_hash, fresh.content_hash);
        assert_eq!(only.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_deadline_fails_fast() {
        let only = Arc::new(FlakyProvider::new("only", 1, 0, ErrorKind::Unknown));
        let gw = gateway(vec![only.clone()]);

        let err = gw
            .analyze(request("rice").with_deadline(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DeadlineExceeded { deadline_ms: 0, .. }));
        assert_eq!(only.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_health_in_failover_order() {
        let a = Arc::new(FlakyProvider::new("a", 2, 0, ErrorKind::Unknown));
        let b = Arc::new(FlakyProvider::new("b", 1, 0, ErrorKind::Unknown));
        let gw = gateway(vec![a, b]);

        let statuses = gw.provider_health();
        assert_eq!(statuses[0].name, "b");
        assert_eq!(statuses[1].priority, 2);
        assert!(statuses.iter().all(|s| s.health.available));

        let checks = gw.health_check_all().await;
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().all(|c| c.healthy));
    }

    fn sweep_config() -> Config {
        let mut config = Config::default();
        config.cache.persist = false;
        config.cache.ttl_secs = 60;
        config.cache.cleanup_interval_secs = 30;
        config.providers = crate::config::ProvidersConfig {
            anthropic: None,
            openai: None,
            hyperbolic: None,
            ollama: Some(crate::config::OllamaConfig::default()),
        };
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config_sweeps_on_configured_interval() {
        use crate::clock::{Clock, ManualClock};

        let clock = ManualClock::starting_now();
        let gw = Gateway::from_config_with_clock(&sweep_config(), clock.shared())
            .await
            .unwrap();
        assert!(gw.is_sweeping());

        let result = AnalysisResult {
            content_hash: "k".to_string(),
            provider: "ollama".to_string(),
            model: "llava".to_string(),
            data: json!({"foods": []}),
            tokens_used: None,
            latency_ms: 1,
            analyzed_at: clock.now(),
            request_id: None,
            cached: false,
        };
        gw.cache().set("k", result).await;
        clock.advance(Duration::from_secs(120));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(gw.cache().len().await, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gw.cache().len().await, 0);
        assert_eq!(gw.cache().stats().await.expirations, 1);
    }

    #[tokio::test]
    async fn test_from_config_rejects_unservable_setup() {
        let mut config = sweep_config();
        config.providers.ollama = None;

        let err = Gateway::from_config(&config).await.err().unwrap();
        assert!(matches!(err, GatewayError::Config(ConfigError::ValidationError(_))));

        let dir = tempfile::tempdir().unwrap();
        config.cache.persist = true;
        config.cache.path = dir.path().join("cache.json").display().to_string();
        let gw = Gateway::from_config(&config).await.unwrap();
        assert!(gw.providers().is_empty());
    }
}
