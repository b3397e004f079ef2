//! Cache entries.

use crate::types::AnalysisResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached analysis keyed by its content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: String,
    pub result: AnalysisResult,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,

    /// Position in the access order; rebuilt on load
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl CacheEntry {
    pub(crate) fn new(content_hash: &str, result: AnalysisResult, now: DateTime<Utc>, seq: u64) -> Self {
        Self {
            content_hash: content_hash.to_string(),
            result,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            seq,
        }
    }

    /// Whether the entry has outlived `ttl` as of `now`.
    ///
    /// Age is measured from insertion, so frequently read entries still expire.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at > ttl
    }
}
