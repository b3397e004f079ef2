//! Periodic out-of-band provider probing.

use crate::provider::{HealthCheck, ProviderAdapter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Background task that runs every provider's `health_check` on an interval
/// and logs when a provider goes up or down.
///
/// Health check results are kept for display only; request routing still relies
/// on each provider's own health tracker.
pub struct HealthMonitor {
    latest: Arc<Mutex<HashMap<String, HealthCheck>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Start probing. The first round runs immediately.
    pub fn spawn(providers: Vec<Arc<dyn ProviderAdapter>>, interval: Duration) -> Self {
        let latest = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let results = latest.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let checks = futures_util::future::join_all(
                            providers.iter().map(|p| p.health_check()),
                        )
                        .await;
                        record_round(&results, checks);
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Health monitor received shutdown signal");
                        break;
                    }
                }
            }
        });

        Self {
            latest,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Most recent health check per provider, sorted by name.
    pub fn latest(&self) -> Vec<HealthCheck> {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let mut checks: Vec<HealthCheck> = latest.values().cloned().collect();
        checks.sort_by(|a, b| a.provider.cmp(&b.provider));
        checks
    }

    /// Stop probing and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("Health monitor task panicked: {e}");
            }
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn record_round(latest: &Mutex<HashMap<String, HealthCheck>>, checks: Vec<HealthCheck>) {
    let mut latest = latest.lock().unwrap_or_else(PoisonError::into_inner);
    for check in checks {
        let was_healthy = latest.get(&check.provider).map(|c| c.healthy);
        match (was_healthy, check.healthy) {
            (Some(false), true) => {
                tracing::info!("Provider {} recovered ({}ms)", check.provider, check.latency_ms)
            }
            (Some(true) | None, false) => tracing::warn!(
                "Provider {} failed health check: {}",
                check.provider,
                check.detail.as_deref().unwrap_or("unhealthy")
            ),
            _ => tracing::trace!("Provider {} healthy ({}ms)", check.provider, check.latency_ms),
        }
        latest.insert(check.provider.clone(), check);
    }
}
