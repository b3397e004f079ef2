//! Content-addressed result cache.
//!
//! Maps a content hash to a previously computed [`AnalysisResult`]. The cache
//! is bounded (strict LRU eviction by access order), time-expiring (TTL from
//! insertion), and optionally persisted to a single JSON file.
//!
//! # Concurrency
//!
//! All operations, reads included, go through one async mutex: a read bumps
//! the access order used for eviction, so it is a mutation like any other.
//! The lock only covers in-memory map work. Persistence is handed to a
//! background writer that takes its own short snapshot under the lock and
//! writes outside it; bursts of mutations coalesce into one write.
//!
//! # Persistence
//!
//! Persistence is best-effort. A crash can lose mutations that were not yet
//! written. Call [`ResultCache::flush`] for a durable point.

mod cleanup;
mod entry;
mod persist;
mod stats;

pub use cleanup::CleanupTask;
pub use entry::CacheEntry;
pub use stats::{CacheCounters, CacheStats};

use crate::clock::{system_clock, SharedClock};
use crate::config::Config;
use crate::error::CacheError;
use crate::types::AnalysisResult;
use chrono::{DateTime, Utc};
use persist::{CacheSnapshot, Persister};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Cache construction options.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Maximum number of entries
    pub max_entries: usize,
    /// Maximum entry age, measured from insertion
    pub ttl: Duration,
    /// Snapshot file; `None` keeps the cache in memory only
    pub path: Option<PathBuf>,
    /// Period of the background expiry sweep; `None` expires lazily only
    pub cleanup_interval: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(24 * 60 * 60),
            path: None,
            cleanup_interval: None,
        }
    }
}

impl CacheOptions {
    pub fn in_memory(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            ttl,
            path: None,
            cleanup_interval: None,
        }
    }

    pub fn persistent(max_entries: usize, ttl: Duration, path: impl Into<PathBuf>) -> Self {
        Self {
            max_entries,
            ttl,
            path: Some(path.into()),
            cleanup_interval: None,
        }
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            max_entries: config.cache.max_entries,
            ttl: Duration::from_secs(config.cache.ttl_secs),
            path: config.cache.persist.then(|| config.cache_path()),
            cleanup_interval: Some(Duration::from_secs(config.cache.cleanup_interval_secs)),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Access sequence -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
    counters: CacheCounters,
    /// Bumped on every mutation; orders persistence writes
    generation: u64,
}

impl CacheState {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn mark_dirty(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn insert(&mut self, entry: CacheEntry) {
        if let Some(old) = self.entries.remove(&entry.content_hash) {
            self.order.remove(&old.seq);
        }
        self.order.insert(entry.seq, entry.content_hash.clone());
        self.entries.insert(entry.content_hash.clone(), entry);
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    /// Record an access and move the entry to the back of the LRU order.
    fn touch(&mut self, key: &str, now: DateTime<Utc>) -> Option<&CacheEntry> {
        let seq = self.next_seq();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.seq);
        entry.seq = seq;
        entry.last_accessed_at = now;
        entry.access_count += 1;
        self.order.insert(seq, key.to_string());
        Some(&*entry)
    }

    fn evict_lru(&mut self) -> Option<CacheEntry> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key)
    }

    fn remove_expired(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> usize {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now, ttl))
            .map(|entry| entry.content_hash.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn snapshot(&self, now: DateTime<Utc>) -> CacheSnapshot {
        CacheSnapshot {
            entries: self.entries.clone(),
            stats: self.counters,
            timestamp: now,
            generation: self.generation,
        }
    }

    /// Load a snapshot, discarding expired entries and trimming to capacity.
    ///
    /// Returns `(restored, dropped)`.
    fn restore(
        &mut self,
        snapshot: CacheSnapshot,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
        max_entries: usize,
    ) -> (usize, usize) {
        self.counters = snapshot.stats;

        let mut entries: Vec<CacheEntry> = snapshot
            .entries
            .into_iter()
            .map(|(key, mut entry)| {
                entry.content_hash = key;
                entry
            })
            .collect();
        let total = entries.len();
        entries.retain(|entry| !entry.is_expired(now, ttl));
        let expired = total - entries.len();
        self.counters.expirations += expired as u64;

        entries.sort_by(|a, b| {
            a.last_accessed_at
                .cmp(&b.last_accessed_at)
                .then_with(|| a.content_hash.cmp(&b.content_hash))
        });
        for mut entry in entries {
            entry.seq = self.next_seq();
            self.insert(entry);
        }

        let mut evicted = 0;
        while self.entries.len() > max_entries && self.evict_lru().is_some() {
            evicted += 1;
        }
        self.counters.evictions += evicted as u64;

        (self.entries.len(), expired + evicted)
    }
}

/// Bounded, time-expiring store of analysis results.
pub struct ResultCache {
    state: Arc<Mutex<CacheState>>,
    max_entries: usize,
    ttl: Duration,
    ttl_delta: chrono::Duration,
    clock: SharedClock,
    persister: Option<Arc<Persister>>,
    persist_tx: Option<watch::Sender<u64>>,
}

impl ResultCache {
    /// Create an in-memory cache.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self::with_clock(max_entries, ttl, system_clock())
    }

    /// Create an in-memory cache reading time from `clock`.
    pub fn with_clock(max_entries: usize, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            max_entries: max_entries.max(1),
            ttl,
            ttl_delta: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(365 * 100)),
            clock,
            persister: None,
            persist_tx: None,
        }
    }

    /// Open a cache, restoring from and persisting to `options.path` if set.
    ///
    /// A missing or corrupt snapshot file never fails startup.
    pub async fn open(options: CacheOptions) -> Self {
        Self::open_with_clock(options, system_clock()).await
    }

    pub async fn open_with_clock(options: CacheOptions, clock: SharedClock) -> Self {
        let mut cache = Self::with_clock(options.max_entries, options.ttl, clock);
        let Some(path) = options.path else {
            return cache;
        };

        let persister = Arc::new(Persister::new(path));
        let mut dropped = 0;
        if let Some(snapshot) = persister.load().await {
            let now = cache.clock.now();
            let mut state = cache.state.lock().await;
            let (restored, removed) =
                state.restore(snapshot, now, cache.ttl_delta, cache.max_entries);
            dropped = removed;
            tracing::debug!(
                "Restored {restored} cached analyses from {:?} ({removed} dropped)",
                persister.path()
            );
        }

        cache.persist_tx = Some(spawn_writer(
            cache.state.clone(),
            persister.clone(),
            cache.clock.clone(),
        ));
        cache.persister = Some(persister);

        if dropped > 0 {
            let generation = cache.state.lock().await.mark_dirty();
            cache.notify(generation);
        }
        cache
    }

    /// Look up a result.
    ///
    /// On a hit the entry's access time and count are bumped and a copy is
    /// returned with `request_id` overlaid and `cached` set. Expired entries
    /// are removed and reported as misses.
    pub async fn get(&self, key: &str, request_id: Option<&str>) -> Option<AnalysisResult> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let status = state
            .entries
            .get(key)
            .map(|entry| entry.is_expired(now, self.ttl_delta));
        match status {
            None => {
                state.counters.misses += 1;
                tracing::debug!(key = short_key(key), "Cache miss");
                None
            }
            Some(true) => {
                state.remove(key);
                state.counters.misses += 1;
                state.counters.expirations += 1;
                let generation = state.mark_dirty();
                drop(state);
                self.notify(generation);
                tracing::debug!(key = short_key(key), "Cache entry expired");
                None
            }
            Some(false) => {
                state.counters.hits += 1;
                let result = state.touch(key, now).map(|entry| entry.result.clone());
                let generation = state.mark_dirty();
                drop(state);
                self.notify(generation);
                tracing::debug!(key = short_key(key), "Cache hit");
                result.map(|result| result.with_overlay(request_id, true))
            }
        }
    }

    /// Store a result, evicting the least recently accessed entry if full.
    ///
    /// Caller-specific fields on `result` are not stored.
    pub async fn set(&self, key: &str, result: AnalysisResult) {
        let now = self.clock.now();
        let result = result.without_overlay();
        let mut state = self.state.lock().await;

        if !state.entries.contains_key(key) && state.entries.len() >= self.max_entries {
            if let Some(evicted) = state.evict_lru() {
                state.counters.evictions += 1;
                tracing::debug!(
                    evicted = short_key(&evicted.content_hash),
                    accesses = evicted.access_count,
                    "Evicted least recently used cache entry"
                );
            }
        }

        let seq = state.next_seq();
        state.insert(CacheEntry::new(key, result, now, seq));
        let generation = state.mark_dirty();
        drop(state);
        self.notify(generation);
    }

    /// Whether a live entry exists. Does not count as an access.
    pub async fn has(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let status = state
            .entries
            .get(key)
            .map(|entry| entry.is_expired(now, self.ttl_delta));
        match status {
            None => false,
            Some(false) => true,
            Some(true) => {
                state.remove(key);
                state.counters.expirations += 1;
                let generation = state.mark_dirty();
                drop(state);
                self.notify(generation);
                false
            }
        }
    }

    /// Copy of an entry, including access bookkeeping, without touching it.
    pub async fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().await.entries.get(key).cloned()
    }

    /// Remove every entry older than the TTL. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let removed = state.remove_expired(now, self.ttl_delta);
        if removed == 0 {
            return 0;
        }
        state.counters.expirations += removed as u64;
        let generation = state.mark_dirty();
        drop(state);
        self.notify(generation);
        removed
    }

    /// Remove every entry. Lifetime counters are kept.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        let removed = state.entries.len();
        state.entries.clear();
        state.order.clear();
        let generation = state.mark_dirty();
        drop(state);
        self.notify(generation);
        tracing::info!("Cleared {removed} cached analyses");
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let oldest = state.entries.values().map(|e| e.created_at).min();
        let newest = state.entries.values().map(|e| e.created_at).max();
        CacheStats::new(
            state.entries.len(),
            self.max_entries,
            state.counters,
            oldest,
            newest,
        )
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write the current contents to disk and wait for the write.
    ///
    /// No-op for in-memory caches.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let Some(persister) = &self.persister else {
            return Ok(());
        };
        let snapshot = self.state.lock().await.snapshot(self.clock.now());
        persister.write(&snapshot).await.map(|_| ())
    }

    /// Run [`ResultCache::cleanup`] every `interval` until the handle is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> CleanupTask {
        CleanupTask::spawn(self.clone(), interval)
    }

    pub fn path(&self) -> Option<&Path> {
        self.persister.as_ref().map(|p| p.path())
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn notify(&self, generation: u64) {
        if let Some(tx) = &self.persist_tx {
            tx.send_replace(generation);
        }
    }
}

/// Background writer: persists the latest state whenever it changes.
///
/// Exits once the cache (and with it the sender) is dropped.
fn spawn_writer(
    state: Arc<Mutex<CacheState>>,
    persister: Arc<Persister>,
    clock: SharedClock,
) -> watch::Sender<u64> {
    let (tx, mut rx) = watch::channel(0u64);
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snapshot = state.lock().await.snapshot(clock.now());
            if let Err(e) = persister.write(&snapshot).await {
                tracing::warn!("Failed to persist result cache: {e}");
            }
        }
    });
    tx
}

fn short_key(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}
