//! OpenAI adapter using the Chat Completions API.
//!
//! Sends the image via data URL in the user message content array. Also
//! serves any OpenAI-compatible endpoint under a different name.

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

/// OpenAI adapter using Chat Completions API.
pub struct OpenAiAdapter {
    name: String,
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
    settings: DispatchSettings,
    health: HealthTracker,
}

impl OpenAiAdapter {
    pub fn new(api_key: &str, model: &str, settings: DispatchSettings, health: HealthTracker) -> Self {
        Self::compatible(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            model,
            settings,
            health,
        )
    }

    /// Create an adapter for an OpenAI-compatible API under another name.
    pub fn compatible(
        name: &str,
        endpoint: &str,
        api_key: &str,
        model: &str,
        settings: DispatchSettings,
        health: HealthTracker,
    ) -> Self {
        Self {
            name: name.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            settings,
            health,
        }
    }

    /// Point the adapter at a different API base URL.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, request: &ProviderRequest) -> ProviderResult<ProviderResponse> {
        let start = Instant::now();

        let mut content = Vec::with_capacity(2);
        if let Payload::Image(image) = &request.payload {
            content.push(ChatContent::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            });
        }
        content.push(ChatContent::Text {
            text: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&self.name, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let hint = retry_after(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(&self.name, status, hint, &text));
        }

        let chat_resp: ChatResponse = resp.json().await.map_err(|e| {
            ProviderError::analysis(&self.name, format!("failed to parse response: {e}"))
        })?;

        let text = chat_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ProviderError::analysis(&self.name, "empty choices array, no content generated")
            })?;

        Ok(ProviderResponse {
            data: parse_analysis(&self.name, &text)?,
            model: chat_resp.model,
            tokens_used: chat_resp.usage.map(|u| u.total_tokens),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

// --- Request types ---

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ChatContent>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
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
        tracked_call(&self.name, &self.health, request.timeout, self.send(request)).await
    }

    async fn health_check(&self) -> HealthCheck {
        let start = Instant::now();
        let result = self
            .client
            .get(format!("{}/models", self.endpoint))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        let (healthy, detail) = match result {
            Ok(resp) if resp.status().is_success() => (true, None),
            Ok(resp) => (false, Some(format!("HTTP {}", resp.status().as_u16()))),
            Err(e) => (false, Some(e.to_string())),
        };
        HealthCheck {
            provider: self.name.clone(),
            healthy,
            latency_ms: start.elapsed().as_millis() as u64,
            detail,
        }
    }
}
