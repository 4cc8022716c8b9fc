//! Scheduler configuration.
//!
//! Plain data with defaults. Loadable from JSON (durations in milliseconds);
//! validated once by `SchedulerBuilder::build`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::RetryPolicy;

/// What `schedule_*` does while the loop is not running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppedPolicy {
    /// Register the task; it runs once the loop starts (or on `poll_once`).
    #[default]
    Queue,

    /// Refuse with `SchedulerError::SchedulerStopped`.
    Reject,
}

/// Capacity of the in-memory execution history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLimits {
    pub successes: usize,
    pub failures: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            successes: 100,
            failures: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay between poll cycles.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// Upper bound on concurrent runs. `None` = unbounded.
    pub max_concurrency: Option<usize>,

    pub retry: RetryPolicy,

    pub history: HistoryLimits,

    /// Used by `stop(None)`.
    #[serde(with = "duration_ms")]
    pub drain_timeout: Duration,

    pub when_stopped: StoppedPolicy,

    /// Result previews in the history are cut to this many characters.
    pub result_preview_chars: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_concurrency: None,
            retry: RetryPolicy::default(),
            history: HistoryLimits::default(),
            drain_timeout: Duration::from_secs(30),
            when_stopped: StoppedPolicy::default(),
            result_preview_chars: 200,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// serde helper: `Duration` as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = SchedulerConfig::default();
        assert_eq!(c.poll_interval, Duration::from_secs(60));
        assert_eq!(c.max_concurrency, None);
        assert_eq!(c.history.successes, 100);
        assert_eq!(c.history.failures, 50);
        assert_eq!(c.retry.max_delay, Duration::from_secs(30 * 60));
        assert_eq!(c.when_stopped, StoppedPolicy::Queue);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"
        {
          "poll_interval": 500,
          "max_concurrency": 4,
          "retry": { "base_delay": 1000, "max_delay": 8000 },
          "when_stopped": "reject"
        }"#;
        let c = SchedulerConfig::from_json(json).unwrap();
        assert_eq!(c.poll_interval, Duration::from_millis(500));
        assert_eq!(c.max_concurrency, Some(4));
        assert_eq!(c.retry.base_delay, Duration::from_secs(1));
        assert_eq!(c.when_stopped, StoppedPolicy::Reject);
        assert_eq!(c.drain_timeout, Duration::from_secs(30));
        assert_eq!(c.result_preview_chars, 200);
    }
}
