//! Reconnection backoff with jitter
//!
//! `min(max_delay, base_delay * 2^attempt)`, then scaled by a random factor
//! in `[1 - jitter, 1 + jitter)` and capped again so the result never
//! exceeds `max_delay`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff schedule and attempt budget for automatic reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectionPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Jitter factor (0.0 - 1.0) to avoid thundering herd
    pub jitter: f64,
    /// Retry budget; `None` retries forever, `Some(0)` disables retries
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: 0.2,
            max_attempts: Some(5),
        }
    }
}

impl ReconnectionPolicy {
    /// Policy that never retries on its own
    pub fn disabled() -> Self {
        Self {
            max_attempts: Some(0),
            ..Self::default()
        }
    }

    /// Policy that retries forever
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }

    /// Un-jittered delay for `attempt` (0-based). Non-decreasing in `attempt`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay for `attempt` with jitter drawn from `sample` in `[0, 1)`.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let base = self.base_delay_for(attempt);
        let factor = 1.0 + (sample.clamp(0.0, 1.0) * 2.0 - 1.0) * self.jitter;
        base.mul_f64(factor.max(0.0)).min(self.max_delay)
    }

    /// Delay before retry number `attempt` (0-based), with random jitter.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, fastrand::f64())
    }

    /// Whether automatic retries are turned off entirely.
    pub fn is_disabled(&self) -> bool {
        self.max_attempts == Some(0)
    }

    /// Whether `attempts` already made use up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}
