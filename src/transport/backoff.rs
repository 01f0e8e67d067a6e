//! Reconnect backoff policy.
//!
//! Implements capped exponential backoff: `base_delay * 2^attempts`, capped at
//! `max_delay`, with a bound on consecutive attempts.

use std::time::Duration;

use crate::config::RealtimeSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap for exponential growth.
    pub max_delay: Duration,
    /// Consecutive failed attempts after which retrying stops.
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Create a new policy from configuration settings.
    pub fn new(settings: &RealtimeSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_attempts: settings.max_attempts,
        }
    }

    /// Delay to wait before the retry following `attempts` earlier retries.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Whether `attempts` retries have used up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}
