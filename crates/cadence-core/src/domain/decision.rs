//! Decision model: what happens to a task after a run.
//!
//! Deciders are pure: given the record, the observed outcome and the
//! completion time they return the next step. Applying it (status,
//! timestamps, due queue) is the executor's job.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::outcome::RunOutcome;
use super::task::ScheduleKind;
use crate::queue::{RetryPolicy, TaskRecord};

/// The next step for a task after a run finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// One-shot success. Terminal.
    Complete,

    /// Recurring task goes back to Pending at `next_run_at` with a fresh
    /// retry budget (after success, or after the budget for this cycle ran out).
    Reschedule { next_run_at: DateTime<Utc> },

    /// Retry after backoff. `retry_count` is the value after the increment.
    Retry {
        retry_count: u32,
        delay: Duration,
        next_run_at: DateTime<Utc>,
    },

    /// One-shot task exhausted its retries. Terminal.
    GiveUp,
}

pub trait Decider: Send + Sync {
    fn decide(&self, task: &TaskRecord, outcome: &RunOutcome, now: DateTime<Utc>) -> Decision;
}

/// Retry-count based decider with capped exponential backoff.
///
/// - success: one-shot completes, recurring runs again `interval` after `now`
/// - failure with budget left: `retry_count += 1`, wait `policy.delay_for(retry_count)`
/// - failure without budget: one-shot gives up, recurring waits a full interval
#[derive(Debug, Clone, Default)]
pub struct RetryDecider {
    retry_policy: RetryPolicy,
}

impl RetryDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Decider for RetryDecider {
    fn decide(&self, task: &TaskRecord, outcome: &RunOutcome, now: DateTime<Utc>) -> Decision {
        match (outcome, task.schedule) {
            (RunOutcome::Succeeded(_), ScheduleKind::OneShot) => Decision::Complete,
            (RunOutcome::Succeeded(_), ScheduleKind::Recurring(interval)) => {
                Decision::Reschedule {
                    next_run_at: add_duration(now, interval),
                }
            }
            (RunOutcome::Failed(_), schedule) => {
                if task.retry_count < task.max_retries {
                    let retry_count = task.retry_count + 1;
                    let delay = self.retry_policy.delay_for(retry_count);
                    Decision::Retry {
                        retry_count,
                        delay,
                        next_run_at: add_duration(now, delay),
                    }
                } else {
                    match schedule {
                        ScheduleKind::OneShot => Decision::GiveUp,
                        ScheduleKind::Recurring(interval) => Decision::Reschedule {
                            next_run_at: add_duration(now, interval),
                        },
                    }
                }
            }
        }
    }
}

/// `at + d`, saturating at the largest representable time.
pub fn add_duration(at: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureReason, Payload, TaskId, TaskSpec};
    use crate::ports::action_fn;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn record(schedule: ScheduleKind, retry_count: u32, max_retries: u32) -> TaskRecord {
        let spec = TaskSpec::new("job", schedule).max_retries(max_retries);
        let mut record = TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            spec,
            action_fn(|_ctx| async { Ok(Payload::empty()) }),
            t0(),
            1,
        );
        record.retry_count = retry_count;
        record
    }

    fn failed() -> RunOutcome {
        RunOutcome::Failed(FailureReason::Action("boom".to_string()))
    }

    fn decider() -> RetryDecider {
        RetryDecider::new(RetryPolicy::new(
            Duration::from_secs(60),
            Duration::from_secs(30 * 60),
        ))
    }

    #[test]
    fn one_shot_success_completes() {
        let d = decider().decide(
            &record(ScheduleKind::OneShot, 0, 3),
            &RunOutcome::Succeeded(Payload::empty()),
            t0(),
        );
        assert_eq!(d, Decision::Complete);
    }

    #[test]
    fn recurring_success_reschedules_from_completion_time() {
        let interval = Duration::from_secs(60);
        let d = decider().decide(
            &record(ScheduleKind::Recurring(interval), 2, 3),
            &RunOutcome::Succeeded(Payload::empty()),
            t0(),
        );
        assert_eq!(
            d,
            Decision::Reschedule {
                next_run_at: t0() + chrono::Duration::seconds(60)
            }
        );
    }

    #[test]
    fn failure_with_budget_retries_with_backoff() {
        let d = decider().decide(&record(ScheduleKind::OneShot, 0, 3), &failed(), t0());
        assert_eq!(
            d,
            Decision::Retry {
                retry_count: 1,
                delay: Duration::from_secs(120),
                next_run_at: t0() + chrono::Duration::seconds(120),
            }
        );
    }

    #[test]
    fn one_shot_without_budget_gives_up() {
        let d = decider().decide(&record(ScheduleKind::OneShot, 3, 3), &failed(), t0());
        assert_eq!(d, Decision::GiveUp);

        let d = decider().decide(&record(ScheduleKind::OneShot, 0, 0), &failed(), t0());
        assert_eq!(d, Decision::GiveUp);
    }

    #[test]
    fn recurring_without_budget_waits_one_interval() {
        let interval = Duration::from_secs(300);
        let d = decider().decide(
            &record(ScheduleKind::Recurring(interval), 3, 3),
            &failed(),
            t0(),
        );
        assert_eq!(
            d,
            Decision::Reschedule {
                next_run_at: t0() + chrono::Duration::seconds(300)
            }
        );
    }

    #[test]
    fn add_duration_saturates() {
        let far = add_duration(t0(), Duration::from_secs(u64::MAX));
        assert_eq!(far, DateTime::<Utc>::MAX_UTC);
    }
}
