//! Task definitions submitted by callers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::SchedulerError;

/// Default retry budget for a new task.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Ordinal priority. Only used as a tie-break among tasks that are equally due.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// How often a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    /// Runs once (plus retries), then becomes eligible for removal.
    OneShot,

    /// Re-schedules itself `interval` after each run until cancelled.
    Recurring(Duration),
}

impl ScheduleKind {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            ScheduleKind::OneShot => None,
            ScheduleKind::Recurring(interval) => Some(*interval),
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, ScheduleKind::Recurring(_))
    }
}

/// A task definition as submitted by a caller.
///
/// The action is passed separately so the spec stays plain data.
///
/// ```ignore
/// let spec = TaskSpec::once("send_report")
///     .priority(Priority::High)
///     .max_retries(2)
///     .timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub schedule: ScheduleKind,
    pub priority: Priority,
    pub max_retries: u32,
    pub timeout: Option<Duration>,

    /// First due time. `None` means "as soon as possible".
    /// A time before creation is clamped to the creation time.
    pub starting_at: Option<DateTime<Utc>>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, schedule: ScheduleKind) -> Self {
        Self {
            name: name.into(),
            schedule,
            priority: Priority::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: None,
            starting_at: None,
        }
    }

    pub fn once(name: impl Into<String>) -> Self {
        Self::new(name, ScheduleKind::OneShot)
    }

    pub fn recurring(name: impl Into<String>, interval: Duration) -> Self {
        Self::new(name, ScheduleKind::Recurring(interval))
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn starting_at(mut self, at: DateTime<Utc>) -> Self {
        self.starting_at = Some(at);
        self
    }

    /// Reject definitions that must never enter the registry.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::InvalidTaskDefinition(
                "name must not be empty".to_string(),
            ));
        }
        if let ScheduleKind::Recurring(interval) = self.schedule
            && interval.is_zero()
        {
            return Err(SchedulerError::InvalidTaskDefinition(format!(
                "interval must be greater than zero (task {})",
                self.name
            )));
        }
        if let Some(timeout) = self.timeout
            && timeout.is_zero()
        {
            return Err(SchedulerError::InvalidTaskDefinition(format!(
                "timeout must be greater than zero (task {})",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_match_contract() {
        let spec = TaskSpec::once("report");
        assert_eq!(spec.priority, Priority::Medium);
        assert_eq!(spec.max_retries, 3);
        assert_eq!(spec.timeout, None);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn priority_orders_by_ordinal() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert_eq!(Priority::High.value(), 3);
    }

    #[rstest]
    #[case::empty_name(TaskSpec::once(""))]
    #[case::blank_name(TaskSpec::once("   "))]
    #[case::zero_interval(TaskSpec::recurring("tick", Duration::ZERO))]
    #[case::zero_timeout(TaskSpec::once("job").timeout(Duration::ZERO))]
    fn invalid_definitions_are_rejected(#[case] spec: TaskSpec) {
        assert!(matches!(
            spec.validate(),
            Err(SchedulerError::InvalidTaskDefinition(_))
        ));
    }

    #[test]
    fn zero_retries_is_a_valid_budget() {
        let spec = TaskSpec::recurring("tick", Duration::from_secs(60)).max_retries(0);
        assert!(spec.validate().is_ok());
        assert_eq!(spec.schedule.interval(), Some(Duration::from_secs(60)));
    }
}
