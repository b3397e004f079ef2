//! Core request and result types for the analysis gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// The content to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisInput {
    /// Raw image bytes, hashed as-is
    Image {
        bytes: Vec<u8>,
        /// Format identifier ("jpeg", "png", "webp", "gif")
        format: String,
    },
    /// Free-text meal description, normalized before hashing
    Text(String),
}

impl AnalysisInput {
    pub fn image(bytes: Vec<u8>, format: impl Into<String>) -> Self {
        Self::Image {
            bytes,
            format: format.into(),
        }
    }

    pub fn text(description: impl Into<String>) -> Self {
        Self::Text(description.into())
    }

    /// Read an image file, detecting its format from magic bytes and
    /// falling back to the file extension.
    pub async fn from_image_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let format = sniff_image_format(&bytes)
            .map(String::from)
            .or_else(|| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.to_lowercase())
            })
            .unwrap_or_else(|| "jpeg".to_string());
        Ok(Self::Image { bytes, format })
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisInput::Image { .. } => "image",
            AnalysisInput::Text(_) => "text",
        }
    }
}

/// Detect common image formats from their leading bytes.
pub fn sniff_image_format(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else if bytes.starts_with(b"GIF8") {
        Some("gif")
    } else {
        None
    }
}

/// A single analysis request from the surrounding application.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub input: AnalysisInput,
    /// Caller-specific identifier, overlaid on cached results
    pub request_id: Option<String>,
    /// Total time budget for this request across all provider attempts
    pub deadline: Option<Duration>,
}

impl AnalysisRequest {
    pub fn new(input: AnalysisInput) -> Self {
        Self {
            input,
            request_id: None,
            deadline: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// The output of a successful analysis.
///
/// `data` is the structured food payload produced by the backend. The
/// gateway and the cache treat it as an opaque, immutable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Content address of the input that produced this result
    pub content_hash: String,

    /// Provider that produced the analysis
    pub provider: String,

    /// Model identifier reported by the provider
    pub model: String,

    /// Structured analysis payload (`{"foods": [...], ...}`)
    pub data: serde_json::Value,

    /// Tokens consumed, if the provider reports them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,

    /// Provider round-trip latency in milliseconds
    pub latency_ms: u64,

    /// When the provider produced the analysis
    pub analyzed_at: DateTime<Utc>,

    // === Caller overlay ===
    /// Identifier of the request this copy was returned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Whether this copy was served from the result cache
    #[serde(default)]
    pub cached: bool,
}

impl AnalysisResult {
    /// Number of food items detected.
    pub fn food_count(&self) -> usize {
        self.data
            .get("foods")
            .and_then(|foods| foods.as_array())
            .map_or(0, Vec::len)
    }

    /// A valid analysis that found nothing to report.
    pub fn is_empty(&self) -> bool {
        self.food_count() == 0
    }

    /// Copy with caller-specific fields cleared, as stored in the cache.
    pub(crate) fn without_overlay(mut self) -> Self {
        self.request_id = None;
        self.cached = false;
        self
    }

    /// Copy with caller-specific fields set.
    pub(crate) fn with_overlay(mut self, request_id: Option<&str>, cached: bool) -> Self {
        self.request_id = request_id.map(String::from);
        self.cached = cached;
        self
    }
}
