//! Retry policy: decides backoff delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::config::duration_ms;

/// Capped exponential backoff.
///
/// delay = base_delay * 2^retry_count, never more than `max_delay`.
///
/// Example with base_delay=60s, max_delay=30min:
/// - retry 1: 2min
/// - retry 2: 4min
/// - retry 3: 8min
/// - retry 4: 16min
/// - retry 5 and later: 30min
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,

    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay before retry number `retry_count` (1-based, after the increment).
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(30 * 60),
        }
    }
}
