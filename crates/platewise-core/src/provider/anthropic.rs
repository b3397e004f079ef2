//! Anthropic adapter using the Messages API.
//!
//! Sends the image as a base64 content block followed by the prompt, or the
//! prompt alone for text descriptions.

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

const NAME: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Anthropic adapter.
pub struct AnthropicAdapter {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
    settings: DispatchSettings,
    health: HealthTracker,
}

impl AnthropicAdapter {
    pub fn new(api_key: &str, model: &str, settings: DispatchSettings, health: HealthTracker) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: "https://api.anthropic.com/v1".to_string(),
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
            content.push(ContentBlock::Image {
                source: ImageSource {
                    source_type: "base64".to_string(),
                    media_type: image.media_type.clone(),
                    data: image.data.clone(),
                },
            });
        }
        content.push(ContentBlock::Text {
            text: request.prompt.clone(),
        });

        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            messages: vec![Message {
                role: "user".to_string(),
                content,
            }],
        };

        let resp = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
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

        let messages_resp: MessagesResponse = resp.json().await.map_err(|e| {
            ProviderError::analysis(NAME, format!("failed to parse Anthropic response: {e}"))
        })?;

        let text = messages_resp
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ProviderResponse {
            data: parse_analysis(NAME, &text)?,
            model: messages_resp.model,
            tokens_used: Some(messages_resp.usage.input_tokens + messages_resp.usage.output_tokens),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

// --- Request types ---

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "image")]
    Image { source: ImageSource },
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

// --- Response types ---

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseContent>,
    model: String,
    usage: Usage,
}

#[derive(Deserialize)]
struct ResponseContent {
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
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
        let result = self
            .client
            .get(format!("{}/models", self.endpoint))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        let (healthy, detail) = match result {
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
