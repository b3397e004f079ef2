//! Periodic expiry sweep.

use super::ResultCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handle to a background task that calls [`ResultCache::cleanup`] on an interval.
///
/// Dropping the handle stops the task.
pub struct CleanupTask {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    pub(crate) fn spawn(cache: Arc<ResultCache>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.cleanup().await;
                        if removed > 0 {
                            tracing::debug!("Cache sweep removed {removed} expired entries");
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Cache cleanup task received shutdown signal");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop the sweep and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("Cache cleanup task panicked: {e}");
            }
        }
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
