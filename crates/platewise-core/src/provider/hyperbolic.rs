//! Hyperbolic adapter (OpenAI-compatible API).
//!
//! Hyperbolic uses the same Chat Completions format as OpenAI,
//! so this delegates to `OpenAiAdapter` with a custom endpoint.

use super::adapter::{
    DispatchSettings, HealthCheck, ProviderAdapter, ProviderRequest, ProviderResponse,
};
use super::openai::OpenAiAdapter;
use crate::error::ProviderResult;
use crate::health::HealthTracker;
use async_trait::async_trait;

/// Hyperbolic adapter wrapping an OpenAI-compatible endpoint.
pub struct HyperbolicAdapter {
    inner: OpenAiAdapter,
}

impl HyperbolicAdapter {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model: &str,
        settings: DispatchSettings,
        health: HealthTracker,
    ) -> Self {
        Self {
            inner: OpenAiAdapter::compatible("hyperbolic", endpoint, api_key, model, settings, health),
        }
    }
}

#[async_trait]
impl ProviderAdapter for HyperbolicAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn settings(&self) -> &DispatchSettings {
        self.inner.settings()
    }

    fn health(&self) -> &HealthTracker {
        self.inner.health()
    }

    async fn analyze(&self, request: &ProviderRequest) -> ProviderResult<ProviderResponse> {
        self.inner.analyze(request).await
    }

    async fn health_check(&self) -> HealthCheck {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_own_name_and_settings() {
        let settings = DispatchSettings {
            priority: 3,
            ..DispatchSettings::default()
        };
        let adapter = HyperbolicAdapter::new(
            "https://api.hyperbolic.xyz/v1/",
            "key",
            "model",
            settings,
            HealthTracker::default(),
        );
        assert_eq!(adapter.name(), "hyperbolic");
        assert_eq!(adapter.priority(), 3);
        assert!(adapter.is_available());
    }
}
