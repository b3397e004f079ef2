//! Provider adapter trait and request/response types.
//!
//! Defines the interface every inference backend implements. Adapters own
//! their wire format, their failure classification, and their
//! [`HealthTracker`]; they never look at the cache or at each other.

use crate::config::DispatchConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::health::HealthTracker;
use crate::types::AnalysisInput;
use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

const IMAGE_PROMPT: &str = "Identify every food and drink visible in this photo. \
Estimate the portion of each item and its nutrition. \
Respond with JSON only, no prose, in exactly this shape: \
{\"foods\": [{\"name\": string, \"portion\": string, \"calories\": number, \
\"protein_g\": number, \"carbs_g\": number, \"fat_g\": number, \"confidence\": number}], \
\"notes\": string}. \
If no food is visible, respond with {\"foods\": [], \"notes\": \"no food detected\"}.";

const TEXT_PROMPT: &str = "Identify every food and drink in the meal described below. \
Estimate the portion of each item and its nutrition. \
Respond with JSON only, no prose, in exactly this shape: \
{\"foods\": [{\"name\": string, \"portion\": string, \"calories\": number, \
\"protein_g\": number, \"carbs_g\": number, \"fat_g\": number, \"confidence\": number}], \
\"notes\": string}. \
If the description contains no food, respond with {\"foods\": [], \"notes\": \"no food detected\"}.\n\n\
Meal: ";

/// Base64-encoded image ready to send to a provider API.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Base64-encoded image bytes
    pub data: String,
    /// MIME type (e.g., "image/jpeg", "image/png")
    pub media_type: String,
}

impl EncodedImage {
    /// Encode raw bytes, mapping the format identifier to a MIME type.
    pub fn from_bytes(bytes: &[u8], format: &str) -> Self {
        let media_type = match format {
            "jpeg" | "jpg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            other => {
                tracing::warn!("Unknown image format '{other}', defaulting to image/jpeg");
                "image/jpeg"
            }
        };

        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            media_type: media_type.to_string(),
        }
    }

    /// Return a data URL suitable for OpenAI-style APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// What the model is asked to look at.
#[derive(Debug, Clone)]
pub enum Payload {
    Image(EncodedImage),
    Text(String),
}

/// Generation parameters shared by every provider.
#[derive(Debug, Clone, Copy)]
pub struct PromptOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

/// A request to analyze one input.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub payload: Payload,
    /// Text prompt for the model
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// The adapter's own per-attempt timeout; set by the gateway
    pub timeout: Duration,
}

impl ProviderRequest {
    /// Build a food analysis request for an input.
    pub fn for_input(input: &AnalysisInput, options: PromptOptions) -> Self {
        let (payload, prompt) = match input {
            AnalysisInput::Image { bytes, format } => (
                Payload::Image(EncodedImage::from_bytes(bytes, format)),
                IMAGE_PROMPT.to_string(),
            ),
            AnalysisInput::Text(text) => (
                Payload::Text(text.trim().to_string()),
                format!("{TEXT_PROMPT}{}", text.trim()),
            ),
        };

        Self {
            payload,
            prompt,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn image(&self) -> Option<&EncodedImage> {
        match &self.payload {
            Payload::Image(image) => Some(image),
            Payload::Text(_) => None,
        }
    }
}

/// A successful provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Parsed analysis payload
    pub data: serde_json::Value,
    /// Model identifier used
    pub model: String,
    /// Number of tokens used (input + output), if reported
    pub tokens_used: Option<u32>,
    /// Round-trip latency in milliseconds
    pub latency_ms: u64,
}

/// Static dispatch settings for one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Lower numbers are tried first
    pub priority: u32,
    /// Extra attempts for retryable failures before failing over
    pub max_retries: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            priority: config.priority,
            max_retries: config.max_retries,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Result of an out-of-band health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub provider: String,
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Trait that all inference backends implement.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (the gateway holds `Arc<dyn ProviderAdapter>`).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name for logging and error attribution (e.g., "anthropic").
    fn name(&self) -> &str;

    fn settings(&self) -> &DispatchSettings;

    fn health(&self) -> &HealthTracker;

    /// Run one analysis call.
    ///
    /// Implementations report the outcome to their health tracker exactly
    /// once, normally by wrapping the call in [`tracked_call`].
    async fn analyze(&self, request: &ProviderRequest) -> ProviderResult<ProviderResponse>;

    /// Lightweight reachability check for out-of-band monitoring.
    ///
    /// Not used on the request path and not recorded in the health tracker.
    async fn health_check(&self) -> HealthCheck;

    fn priority(&self) -> u32 {
        self.settings().priority
    }

    fn max_retries(&self) -> u32 {
        self.settings().max_retries
    }

    fn timeout(&self) -> Duration {
        self.settings().timeout
    }

    fn is_available(&self) -> bool {
        self.health().is_available()
    }
}

/// Run a provider call under a timeout and record its outcome.
///
/// A timed-out call becomes a retryable server fault and is recorded like
/// any other failure.
pub async fn tracked_call<F>(
    provider: &str,
    health: &HealthTracker,
    timeout: Duration,
    call: F,
) -> ProviderResult<ProviderResponse>
where
    F: Future<Output = ProviderResult<ProviderResponse>>,
{
    let outcome = match tokio::time::timeout(timeout, call).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ProviderError::timeout(provider, timeout)),
    };

    match &outcome {
        Ok(_) => health.record_success(),
        Err(e) => health.record_error(e),
    }
    outcome
}

/// Extract the analysis JSON object from model output.
///
/// Models sometimes wrap JSON in code fences or add a sentence around it;
/// everything between the first `{` and the last `}` is parsed. The object
/// must carry a `foods` array.
pub fn parse_analysis(provider: &str, text: &str) -> ProviderResult<serde_json::Value> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderError::analysis(
            provider,
            "empty response, no content generated",
        ));
    }

    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(ProviderError::analysis(
            provider,
            format!("response contains no JSON object: {}", truncate(text, 120)),
        ));
    };
    if end < start {
        return Err(ProviderError::analysis(
            provider,
            format!("response contains no JSON object: {}", truncate(text, 120)),
        ));
    }

    let value: serde_json::Value = serde_json::from_str(&text[start..=end]).map_err(|e| {
        ProviderError::analysis(provider, format!("response is not valid JSON: {e}"))
    })?;

    if !value.get("foods").is_some_and(|foods| foods.is_array()) {
        return Err(ProviderError::analysis(
            provider,
            "response JSON has no \"foods\" array",
        ));
    }
    Ok(value)
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Resolve `${ENV_VAR}` references in config strings.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
