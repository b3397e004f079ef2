//! Ollama adapter for local vision model inference.
//!
//! Talks to a local Ollama instance via its HTTP API.
//! No authentication required, just needs Ollama running locally.

use super::adapter::{
    parse_analysis, tracked_call, DispatchSettings, HealthCheck, Payload, ProviderAdapter,
    ProviderRequest, ProviderResponse,
};
use super::retry::{classify_status, classify_transport, retry_after};
use crate::error::{ProviderError, ProviderResult};
use crate::health::HealthTracker;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const NAME: &str = "ollama";

/// Ollama adapter for local vision model inference.
pub struct OllamaAdapter {
    endpoint: String,
    model: String,
    client: reqwest::Client,
    settings: DispatchSettings,
    health: HealthTracker,
}

impl OllamaAdapter {
    pub fn new(endpoint: &str, model: &str, settings: DispatchSettings, health: HealthTracker) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
            settings,
            health,
        }
    }

    async fn send(&self, request: &ProviderRequest) -> ProviderResult<ProviderResponse> {
        let start = Instant::now();

        let images = match &request.payload {
            Payload::Image(image) => vec![image.data.clone()],
            Payload::Text(_) => Vec::new(),
        };

        let body = OllamaRequest {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            images,
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let resp = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(NAME, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let hint = retry_after(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(NAME, status, hint, &text));
        }

        let ollama_resp: OllamaResponse = resp.json().await.map_err(|e| {
            ProviderError::analysis(NAME, format!("failed to parse Ollama response: {e}"))
        })?;

        let tokens_used = match (ollama_resp.prompt_eval_count, ollama_resp.eval_count) {
            (None, None) => None,
            (prompt, eval) => Some(prompt.unwrap_or(0) + eval.unwrap_or(0)),
        };

        Ok(ProviderResponse {
            data: parse_analysis(NAME, &ollama_resp.response)?,
            model: self.model.clone(),
            tokens_used,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Ollama /api/generate request body.
#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama /api/generate response.
#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    fn health(&self) -> &HealthTracker {
        &self.health
    }

    async fn analyze(&self, request: &ProviderRequest) -> ProviderResult<ProviderResponse> {
        tracked_call(NAME, &self.health, request.timeout, self.send(request)).await
    }

    async fn health_check(&self) -> HealthCheck {
        let start = Instant::now();
        let url = format!("{}/api/tags", self.endpoint);
        let (healthy, detail) = match self.client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(resp) if resp.status().is_success() => (true, None),
            Ok(resp) => (false, Some(format!("HTTP {}", resp.status().as_u16()))),
            Err(e) => (false, Some(e.to_string())),
        };
        HealthCheck {
            provider: NAME.to_string(),
            healthy,
            latency_ms: start.elapsed().as_millis() as u64,
            detail,
        }
    }
}
