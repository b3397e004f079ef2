//! Failure classification and backoff for provider calls.
//!
//! HTTP statuses, vendor error bodies and transport failures are mapped onto
//! [`ErrorKind`] here so every adapter classifies the same way.

use crate::error::{ErrorKind, ProviderError};
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

const MAX_BACKOFF_MS: u64 = 30_000;

/// Classify a non-success HTTP response.
///
/// The vendor error type in the body wins over the status code when it is
/// recognised: Anthropic reports overload as `overloaded_error` under 529,
/// OpenAI reports exhausted billing quota as `insufficient_quota` under 429.
pub fn classify_status(
    provider: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    let code = status.as_u16();
    let detail = vendor_error(body);
    let message = match &detail {
        Some(VendorError {
            message: Some(msg), ..
        }) => format!("HTTP {code}: {msg}"),
        _ if body.trim().is_empty() => format!("HTTP {code}"),
        _ => format!("HTTP {code}: {}", super::adapter::truncate(body.trim(), 200)),
    };

    let kind = detail
        .as_ref()
        .and_then(|d| d.error_type.as_deref())
        .and_then(kind_for_vendor_type)
        .unwrap_or_else(|| kind_for_status(status));

    let error = match kind {
        ErrorKind::RateLimit => ProviderError::rate_limited(provider, message, retry_after),
        kind => ProviderError::new(provider, kind, message),
    };
    error.with_status(code)
}

fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        429 => ErrorKind::RateLimit,
        408 => ErrorKind::ServerFault,
        400 | 413 | 415 | 422 => ErrorKind::AnalysisFault,
        code if (500..=599).contains(&code) => ErrorKind::ServerFault,
        _ => ErrorKind::Unknown,
    }
}

fn kind_for_vendor_type(error_type: &str) -> Option<ErrorKind> {
    match error_type {
        "rate_limit_error" | "rate_limit_exceeded" => Some(ErrorKind::RateLimit),
        "overloaded_error" | "server_error" | "api_error" => Some(ErrorKind::ServerFault),
        "insufficient_quota" => Some(ErrorKind::Unknown),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct VendorError {
    error_type: Option<String>,
    message: Option<String>,
}

/// Pull `error.type`/`error.code` and `error.message` out of a JSON error body.
///
/// Anthropic: `{"type":"error","error":{"type":"overloaded_error","message":".."}}`
/// OpenAI:    `{"error":{"message":"..","type":"..","code":"rate_limit_exceeded"}}`
/// Ollama:    `{"error":".."}`
fn vendor_error(body: &str) -> Option<VendorError> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;

    if let Some(message) = error.as_str() {
        return Some(VendorError {
            error_type: None,
            message: Some(message.to_string()),
        });
    }

    let field = |name: &str| error.get(name).and_then(|v| v.as_str()).map(str::to_string);
    let code = field("code");
    let error_type = match code.as_deref() {
        Some(c) if kind_for_vendor_type(c).is_some() => code,
        _ => field("type"),
    };
    Some(VendorError {
        error_type,
        message: field("message"),
    })
}

/// Classify a request that never produced an HTTP response.
pub fn classify_transport(provider: &str, error: &reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::server_fault(provider, format!("request timed out: {error}"))
    } else if error.is_connect() {
        ProviderError::server_fault(provider, format!("connection failed: {error}"))
    } else if error.is_decode() || error.is_body() {
        ProviderError::analysis(provider, format!("unreadable response body: {error}"))
    } else {
        ProviderError::unknown(provider, format!("request failed: {error}"))
    }
}

/// Parse a `Retry-After` header given in seconds.
///
/// HTTP-date values are ignored; the configured cooldown applies instead.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Calculate exponential backoff duration for a given attempt.
///
/// Uses `base_delay * 2^attempt` with a cap at 30 seconds.
pub fn backoff_duration(attempt: u32, base_delay_ms: u64) -> Duration {
    let delay = base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(MAX_BACKOFF_MS))
}

/// Backoff with up to 25% random jitter added, still capped at 30 seconds.
pub fn backoff_with_jitter(attempt: u32, base_delay_ms: u64) -> Duration {
    let base = backoff_duration(attempt, base_delay_ms);
    let spread = base.as_millis() as u64 / 4;
    if spread == 0 {
        return base;
    }
    let jitter = rand::thread_rng().gen_range(0..=spread);
    Duration::from_millis((base.as_millis() as u64 + jitter).min(MAX_BACKOFF_MS))
}
