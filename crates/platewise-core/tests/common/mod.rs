//! Shared helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use platewise_core::clock::ManualClock;
use platewise_core::error::{ErrorKind, ProviderError, ProviderResult};
use platewise_core::provider::{
    tracked_call, DispatchSettings, HealthCheck, ProviderAdapter, ProviderRequest,
    ProviderResponse,
};
use platewise_core::{
    AnalysisInput, AnalysisRequest, AnalysisResult, Gateway, GatewayOptions, HealthPolicy,
    HealthTracker, ResultCache,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Step {
    /// Succeed with this payload
    Reply(serde_json::Value),
    /// Fail with this classification
    Fail(ErrorKind),
    /// Sleep, then succeed with a single-food payload
    Stall(Duration),
}

/// Provider adapter that replays a script, then repeats `fallback` forever.
pub struct ScriptedProvider {
    name: String,
    settings: DispatchSettings,
    health: HealthTracker,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(name: &str, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            settings: DispatchSettings {
                priority,
                max_retries: 0,
                timeout: Duration::from_secs(5),
            },
            health: HealthTracker::default(),
            script: Mutex::new(VecDeque::new()),
            fallback: Step::Reply(meal()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.settings.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: &ManualClock) -> Self {
        self.health = HealthTracker::with_clock(HealthPolicy::default(), clock.shared());
        self
    }

    pub fn then(self, step: Step) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(step);
        self
    }

    pub fn always(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Drive the tracker to the unavailable state with `min_requests` server faults.
    pub fn make_unavailable(&self) {
        for _ in 0..self.health.policy().min_requests {
            self.health
                .record_error(&ProviderError::server_fault(&self.name, "seeded failure"));
        }
        assert!(!self.health.is_available());
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    fn health(&self) -> &HealthTracker {
        &self.health
    }

    async fn analyze(&self, request: &ProviderRequest) -> ProviderResult<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let name = self.name.clone();

        tracked_call(&self.name, &self.health, request.timeout, async move {
            match step {
                Step::Reply(data) => Ok(response(&name, data)),
                Step::Fail(kind) => Err(ProviderError::new(name, kind, "scripted failure")),
                Step::Stall(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(response(&name, meal()))
                }
            }
        })
        .await
    }

    async fn health_check(&self) -> HealthCheck {
        HealthCheck {
            provider: self.name.clone(),
            healthy: true,
            latency_ms: 0,
            detail: None,
        }
    }
}

fn response(name: &str, data: serde_json::Value) -> ProviderResponse {
    ProviderResponse {
        data,
        model: format!("{name}-model"),
        tokens_used: Some(42),
        latency_ms: 3,
    }
}

/// A one-food analysis payload.
pub fn meal() -> serde_json::Value {
    json!({
        "foods": [{"name": "grilled salmon", "portion": "150 g", "calories": 310}],
        "notes": ""
    })
}

/// A valid analysis that found no food.
pub fn no_food() -> serde_json::Value {
    json!({"foods": [], "notes": "no food detected"})
}

pub fn gateway_with(cache: Arc<ResultCache>, providers: Vec<Arc<ScriptedProvider>>) -> Gateway {
    let providers = providers
        .into_iter()
        .map(|p| p as Arc<dyn ProviderAdapter>)
        .collect();
    let options = GatewayOptions {
        retry_delay: Duration::from_millis(1),
        ..GatewayOptions::default()
    };
    Gateway::new(cache, providers, options)
}

pub fn memory_cache() -> Arc<ResultCache> {
    Arc::new(ResultCache::new(100, Duration::from_secs(3600)))
}

pub fn text_request(text: &str) -> AnalysisRequest {
    AnalysisRequest::new(AnalysisInput::text(text))
}

/// A stored result as the gateway would produce it.
pub fn result_for(key: &str, provider: &str) -> AnalysisResult {
    AnalysisResult {
        content_hash: key.to_string(),
        provider: provider.to_string(),
        model: format!("{provider}-model"),
        data: meal(),
        tokens_used: Some(42),
        latency_ms: 3,
        analyzed_at: chrono::Utc::now(),
        request_id: None,
        cached: false,
    }
}
