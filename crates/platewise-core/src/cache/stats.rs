//! Cache statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime counters, persisted alongside the entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room for a new one
    pub evictions: u64,
    /// Entries removed because they outlived the TTL
    pub expirations: u64,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_requests: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Insertion time of the oldest entry
    pub oldest: Option<DateTime<Utc>>,
    /// Insertion time of the newest entry
    pub newest: Option<DateTime<Utc>>,
}

impl CacheStats {
    pub(crate) fn new(
        size: usize,
        max_size: usize,
        counters: CacheCounters,
        oldest: Option<DateTime<Utc>>,
        newest: Option<DateTime<Utc>>,
    ) -> Self {
        let total_requests = counters.hits + counters.misses;
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            counters.hits as f64 / total_requests as f64
        };
        Self {
            size,
            max_size,
            hits: counters.hits,
            misses: counters.misses,
            hit_rate,
            total_requests,
            evictions: counters.evictions,
            expirations: counters.expirations,
            oldest,
            newest,
        }
    }
}
