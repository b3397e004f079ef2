//! Disk persistence for the result cache.
//!
//! The whole cache is written as one JSON document
//! `{ "entries": {...}, "stats": {...}, "timestamp": ... }`. Writes go to a
//! temporary sibling file that is renamed over the target, so a crash mid-write
//! leaves the previous snapshot intact.

use super::entry::CacheEntry;
use super::stats::CacheCounters;
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Serialized form of the cache.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CacheSnapshot {
    pub entries: HashMap<String, CacheEntry>,
    #[serde(default)]
    pub stats: CacheCounters,
    pub timestamp: DateTime<Utc>,

    /// Mutation counter at the time the snapshot was taken
    #[serde(skip)]
    pub generation: u64,
}

/// Writes snapshots to a single file, never replacing a newer one with an older one.
#[derive(Debug)]
pub(crate) struct Persister {
    path: PathBuf,
    last_written: Mutex<Option<u64>>,
}

impl Persister {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_written: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot file.
    ///
    /// A missing or unreadable file yields `None`; the cache then starts empty.
    pub async fn load(&self) -> Option<CacheSnapshot> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No cache file at {:?}, starting empty", self.path);
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to read cache file {:?}: {e}. Starting empty.", self.path);
                return None;
            }
        };

        match serde_json::from_slice::<CacheSnapshot>(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!("Cache file {:?} is corrupt: {e}. Starting empty.", self.path);
                None
            }
        }
    }

    /// Write a snapshot unless a snapshot at least as new is already on disk.
    ///
    /// Returns whether the file was written.
    pub async fn write(&self, snapshot: &CacheSnapshot) -> Result<bool, CacheError> {
        let mut last_written = self.last_written.lock().await;
        if last_written.is_some_and(|last| last >= snapshot.generation) {
            return Ok(false);
        }

        let bytes = serde_json::to_vec(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CacheError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| CacheError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| CacheError::Io {
                path: self.path.clone(),
                source,
            })?;

        *last_written = Some(snapshot.generation);
        tracing::trace!(
            "Persisted {} cache entries to {:?}",
            snapshot.entries.len(),
            self.path
        );
        Ok(true)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_snapshot(generation: u64) -> CacheSnapshot {
        CacheSnapshot {
            entries: HashMap::new(),
            stats: CacheCounters {
                hits: generation,
                ..CacheCounters::default()
            },
            timestamp: Utc::now(),
            generation,
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::new(dir.path().join("absent.json"));
        assert!(persister.load().await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let persister = Persister::new(path);
        assert!(persister.load().await.is_none());
    }

    #[tokio::test]
    async fn test_write_creates_parent_dirs_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let persister = Persister::new(path.clone());

        assert!(persister.write(&empty_snapshot(1)).await.unwrap());
        assert!(path.exists());
        assert!(!temp_path(&path).exists());

        let loaded = persister.load().await.unwrap();
        assert_eq!(loaded.stats.hits, 1);
    }

    #[tokio::test]
    async fn test_older_snapshot_never_overwrites_newer() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::new(dir.path().join("cache.json"));

        assert!(persister.write(&empty_snapshot(5)).await.unwrap());
        assert!(!persister.write(&empty_snapshot(3)).await.unwrap());
        assert!(!persister.write(&empty_snapshot(5)).await.unwrap());

        let loaded = persister.load().await.unwrap();
        assert_eq!(loaded.stats.hits, 5);
    }
}
