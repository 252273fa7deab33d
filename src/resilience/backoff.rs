//! Exponential backoff and retry bookkeeping.

use std::time::Duration;

use crate::config::RetryConfig;

/// Bounds for a retry loop: attempt budget and starting interval.
///
/// The same policy is applied independently by the upstream transport
/// (connection-level failures) and by the resumption controller
/// (mid-stream failures).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_attempts: u32,
    /// Sleep before the first retry; doubles on every subsequent one.
    pub initial_interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_interval: Duration) -> Self {
        Self {
            max_attempts,
            initial_interval,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_interval: Duration::from_millis(config.initial_interval_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Mutable side of a retry loop: how many retries were spent and the
/// next sleep interval.
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    attempts: u32,
    interval: Duration,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts: 0,
            interval: policy.initial_interval,
        }
    }

    /// Whether the attempt budget is spent.
    pub fn exhausted(&self, policy: &RetryPolicy) -> bool {
        self.attempts >= policy.max_attempts
    }

    /// The sleep interval for the next retry.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record one retry: bump the counter and double the interval.
    pub fn bump(&mut self) {
        self.attempts += 1;
        self.interval = self.interval.saturating_mul(2);
    }

    /// Return the counter and interval to their initial values.
    ///
    /// The resumption controller calls this when a stream makes enough
    /// forward progress that earlier failures should no longer count
    /// against the budget.
    pub fn reset(&mut self, policy: &RetryPolicy) {
        self.attempts = 0;
        self.interval = policy.initial_interval;
    }
}
