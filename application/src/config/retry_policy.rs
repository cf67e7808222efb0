//! Retry/backoff policy for completion calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff: `base_delay × 2^attempt`, capped at `max_delay`.
///
/// Delays strictly increase only while the cap is not reached; see
/// [`reaches_cap`](Self::reaches_cap).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Wall-clock budget for a single backend request.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `attempt + 1` (`attempt` is 0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether the last retry would be clamped to `max_delay`, after which
    /// delays stop growing.
    pub fn reaches_cap(&self) -> bool {
        let Some(last) = self.max_retries.checked_sub(1) else {
            return false;
        };
        2u32.checked_pow(last)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .is_none_or(|delay| delay > self.max_delay)
    }
}
