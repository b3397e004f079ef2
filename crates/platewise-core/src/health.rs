//! Per-provider health tracking.
//!
//! Each adapter holds one [`HealthTracker`] and reports every call outcome to
//! it. The gateway reads [`HealthTracker::is_available`] to decide whether a
//! provider is worth invoking at all.
//!
//! Availability is deliberately permissive: a provider is skipped while a
//! rate-limit cooldown is active, or once its lifetime error rate reaches
//! the configured ceiling. A single failure never takes it out of rotation.

use crate::clock::{system_clock, SharedClock};
use crate::config::HealthConfig;
use crate::error::{ErrorKind, ProviderError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Thresholds used to compute availability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthPolicy {
    /// Error rate at or above which the provider is unavailable
    pub max_error_rate: f64,
    /// The error-rate gate only applies after this many requests
    pub min_requests: u64,
    /// Cooldown after a rate limit that carried no retry-after hint
    pub rate_limit_cooldown: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_error_rate: 0.8,
            min_requests: 5,
            rate_limit_cooldown: Duration::from_secs(60),
        }
    }
}

impl From<&HealthConfig> for HealthPolicy {
    fn from(config: &HealthConfig) -> Self {
        Self {
            max_error_rate: config.max_error_rate,
            min_requests: config.min_requests,
            rate_limit_cooldown: Duration::from_secs(config.rate_limit_cooldown_secs),
        }
    }
}

/// The most recent failure seen by a tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
    pub rate_limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Default)]
struct HealthState {
    request_count: u64,
    error_count: u64,
    last_error: Option<ErrorRecord>,
    last_success_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a provider's health.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub request_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Rolling health statistics for one provider.
#[derive(Debug)]
pub struct HealthTracker {
    state: Mutex<HealthState>,
    policy: HealthPolicy,
    clock: SharedClock,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthPolicy::default())
    }
}

impl HealthTracker {
    pub fn new(policy: HealthPolicy) -> Self {
        Self::with_clock(policy, system_clock())
    }

    pub fn with_clock(policy: HealthPolicy, clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(HealthState::default()),
            policy,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HealthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.request_count += 1;
        state.last_success_at = Some(now);
    }

    pub fn record_error(&self, error: &ProviderError) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.request_count += 1;
        if error.kind.counts_against_health() {
            state.error_count += 1;
        }
        state.last_error = Some(ErrorRecord {
            kind: error.kind,
            message: error.message.clone(),
            at: now,
            rate_limited: error.is_rate_limit(),
            retry_after_secs: error.retry_after.map(|d| d.as_secs()),
        });
        tracing::debug!(
            provider = %error.provider,
            kind = %error.kind,
            requests = state.request_count,
            errors = state.error_count,
            "Recorded provider error"
        );
    }

    pub fn is_available(&self) -> bool {
        let now = self.clock.now();
        let state = self.lock();
        self.evaluate(&state, now).0
    }

    pub fn snapshot(&self) -> ProviderHealth {
        let now = self.clock.now();
        let state = self.lock();
        let (available, cooldown_until) = self.evaluate(&state, now);
        ProviderHealth {
            request_count: state.request_count,
            error_count: state.error_count,
            error_rate: error_rate(&state),
            available,
            cooldown_until,
            last_error: state.last_error.clone(),
            last_success_at: state.last_success_at,
        }
    }

    /// Returns availability plus the end of any active cooldown.
    fn evaluate(&self, state: &HealthState, now: DateTime<Utc>) -> (bool, Option<DateTime<Utc>>) {
        if let Some(last) = state.last_error.as_ref().filter(|e| e.rate_limited) {
            let wait = last
                .retry_after_secs
                .map(Duration::from_secs)
                .unwrap_or(self.policy.rate_limit_cooldown);
            let wait = chrono::Duration::from_std(wait).unwrap_or(chrono::Duration::zero());
            let can_retry_at = last.at + wait;
            if now <= can_retry_at {
                return (false, Some(can_retry_at));
            }
        }

        if state.request_count < self.policy.min_requests {
            return (true, None);
        }
        (error_rate(state) < self.policy.max_error_rate, None)
    }
}

fn error_rate(state: &HealthState) -> f64 {
    if state.request_count == 0 {
        0.0
    } else {
        state.error_count as f64 / state.request_count as f64
    }
}
