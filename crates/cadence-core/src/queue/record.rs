//! Task record: definition + mutable run state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::domain::{
    Decision, FailureReason, Payload, Priority, RunOutcome, ScheduleKind, TaskId, TaskSpec,
    TaskStatus,
};
use crate::ports::{ActionContext, CancelSignal, TaskAction};

/// The authoritative state of one task.
///
/// Design:
/// - Registry owns records; the due queue holds TaskId only.
/// - All state transitions go through methods on this type.
/// - Callers can cancel; every other transition is driven by the executor.
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub schedule: ScheduleKind,
    pub priority: Priority,
    pub max_retries: u32,
    pub timeout: Option<Duration>,
    pub action: Arc<dyn TaskAction>,

    /// Registry insertion sequence (last tie-break in the due order).
    pub seq: u64,

    pub status: TaskStatus,

    /// Retries consumed in the current cycle. Never exceeds `max_retries`.
    pub retry_count: u32,

    /// Executions started over the task's lifetime.
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,

    /// Mutually exclusive with `last_error`.
    pub last_result: Option<Payload>,
    pub last_error: Option<FailureReason>,

    /// `remove` was called while running; drop the record once the run ends.
    pub pending_removal: bool,

    /// A run is dispatched and not yet finished. Independent of `status`:
    /// a task cancelled mid-run is Cancelled but still in a run.
    in_run: bool,

    cancel_tx: watch::Sender<bool>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        spec: TaskSpec,
        action: Arc<dyn TaskAction>,
        created_at: DateTime<Utc>,
        seq: u64,
    ) -> Self {
        let next_run_at = spec
            .starting_at
            .map_or(created_at, |at| at.max(created_at));
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id,
            name: spec.name,
            schedule: spec.schedule,
            priority: spec.priority,
            max_retries: spec.max_retries,
            timeout: spec.timeout,
            action,
            seq,
            status: TaskStatus::Pending,
            retry_count: 0,
            attempts: 0,
            created_at,
            last_run_at: None,
            last_finished_at: None,
            next_run_at,
            last_result: None,
            last_error: None,
            pending_removal: false,
            in_run: false,
            cancel_tx,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_dispatchable() && self.next_run_at <= now
    }

    /// Pending -> Running. Returns the context for the action.
    pub fn start_run(&mut self, now: DateTime<Utc>) -> ActionContext {
        self.status = TaskStatus::Running;
        self.in_run = true;
        self.attempts += 1;
        self.last_run_at = Some(now);
        ActionContext {
            task_id: self.id,
            task_name: self.name.clone(),
            attempt: self.attempts,
            retry_count: self.retry_count,
            cancel: CancelSignal::new(self.cancel_tx.subscribe()),
        }
    }

    /// Record the outcome and apply the decision.
    ///
    /// A task cancelled mid-run keeps its outcome but stays Cancelled.
    /// Returns `Some(next_run_at)` when the task must go back into the due queue.
    pub fn finish_run(
        &mut self,
        outcome: RunOutcome,
        decision: Decision,
        finished_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.in_run = false;
        self.last_finished_at = Some(finished_at);
        match outcome {
            RunOutcome::Succeeded(payload) => {
                self.last_result = Some(payload);
                self.last_error = None;
            }
            RunOutcome::Failed(reason) => {
                self.last_result = None;
                self.last_error = Some(reason);
            }
        }

        if self.status == TaskStatus::Cancelled {
            return None;
        }

        match decision {
            Decision::Complete => {
                self.status = TaskStatus::Completed;
                None
            }
            Decision::GiveUp => {
                self.status = TaskStatus::Failed;
                None
            }
            Decision::Reschedule { next_run_at } => {
                self.status = TaskStatus::Pending;
                self.retry_count = 0;
                self.next_run_at = next_run_at.max(finished_at);
                Some(self.next_run_at)
            }
            Decision::Retry {
                retry_count,
                next_run_at,
                ..
            } => {
                self.status = TaskStatus::Pending;
                self.retry_count = retry_count.min(self.max_retries);
                self.next_run_at = next_run_at.max(finished_at);
                Some(self.next_run_at)
            }
        }
    }

    /// Mark as cancelled and fire the cooperative signal.
    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.cancel_tx.send_replace(true);
    }

    pub fn is_in_run(&self) -> bool {
        self.in_run
    }

    /// A finished one-shot task (or a cancelled one) that can be dropped.
    /// Never true while a run is still in flight.
    pub fn is_removable(&self) -> bool {
        if self.in_run {
            return false;
        }
        match self.status {
            TaskStatus::Cancelled => true,
            TaskStatus::Completed | TaskStatus::Failed => !self.schedule.is_recurring(),
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("priority", &self.priority)
            .field("status", &self.status)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .field("attempts", &self.attempts)
            .field("in_run", &self.in_run)
            .field("next_run_at", &self.next_run_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::action_fn;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn noop() -> Arc<dyn TaskAction> {
        action_fn(|_ctx| async { Ok(Payload::empty()) })
    }

    fn record(spec: TaskSpec) -> TaskRecord {
        TaskRecord::new(TaskId::from_ulid(Ulid::new()), spec, noop(), t0(), 1)
    }

    #[test]
    fn new_record_is_pending_and_due_at_creation() {
        let r = record(TaskSpec::once("job"));
        assert_eq!(r.status, TaskStatus::Pending);
        assert_eq!(r.next_run_at, t0());
        assert!(r.is_due(t0()));
    }

    #[test]
    fn past_start_time_is_clamped_to_creation() {
        let r = record(TaskSpec::once("job").starting_at(t0() - chrono::Duration::hours(1)));
        assert_eq!(r.next_run_at, t0());

        let later = t0() + chrono::Duration::minutes(5);
        let r = record(TaskSpec::once("job").starting_at(later));
        assert_eq!(r.next_run_at, later);
        assert!(!r.is_due(t0()));
    }

    #[test]
    fn start_run_counts_attempts() {
        let mut r = record(TaskSpec::once("job"));
        let ctx = r.start_run(t0());
        assert_eq!(r.status, TaskStatus::Running);
        assert_eq!(ctx.attempt, 1);
        assert_eq!(r.last_run_at, Some(t0()));
        assert!(!r.is_due(t0()));
    }

    #[test]
    fn result_and_error_are_mutually_exclusive() {
        let mut r = record(TaskSpec::recurring("tick", Duration::from_secs(60)));
        let next = t0() + chrono::Duration::seconds(60);

        r.start_run(t0());
        r.finish_run(
            RunOutcome::Failed(FailureReason::Action("boom".into())),
            Decision::Retry {
                retry_count: 1,
                delay: Duration::from_secs(2),
                next_run_at: next,
            },
            t0(),
        );
        assert!(r.last_result.is_none());
        assert!(r.last_error.is_some());

        r.start_run(next);
        r.finish_run(
            RunOutcome::Succeeded(Payload::new("ok")),
            Decision::Reschedule { next_run_at: next },
            next,
        );
        assert_eq!(r.last_result, Some(Payload::new("ok")));
        assert!(r.last_error.is_none());
        assert_eq!(r.retry_count, 0);
    }

    #[test]
    fn cancelled_during_run_stays_cancelled() {
        let mut r = record(TaskSpec::recurring("tick", Duration::from_secs(60)));
        let ctx = r.start_run(t0());
        r.cancel();
        assert!(ctx.cancel.is_cancelled());

        let requeue = r.finish_run(
            RunOutcome::Succeeded(Payload::empty()),
            Decision::Reschedule {
                next_run_at: t0() + chrono::Duration::seconds(60),
            },
            t0(),
        );
        assert_eq!(requeue, None);
        assert_eq!(r.status, TaskStatus::Cancelled);
        assert!(r.is_removable());
    }

    #[test]
    fn cancelled_record_is_not_removable_until_its_run_ends() {
        let mut r = record(TaskSpec::once("job"));
        r.start_run(t0());
        r.cancel();
        assert!(r.is_in_run());
        assert!(!r.is_removable());

        r.finish_run(RunOutcome::Succeeded(Payload::empty()), Decision::Complete, t0());
        assert!(!r.is_in_run());
        assert!(r.is_removable());
    }

    #[test]
    fn next_run_never_precedes_finish_time() {
        let mut r = record(TaskSpec::once("job"));
        r.start_run(t0());
        let finished = t0() + chrono::Duration::seconds(10);
        let next = r.finish_run(
            RunOutcome::Failed(FailureReason::Action("boom".into())),
            Decision::Retry {
                retry_count: 1,
                delay: Duration::ZERO,
                next_run_at: t0(),
            },
            finished,
        );
        assert_eq!(next, Some(finished));
    }
}
