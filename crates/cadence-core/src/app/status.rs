//! Status - ステータスクエリのビュー
//!
//! すべて serde でシリアライズ可能（HTTP ハンドラなどがそのまま返せる形）。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::ExecutionRecord;
use crate::domain::{FailureReason, LoopState, Payload, Priority, TaskId, TaskStatus};
use crate::queue::TaskRecord;

/// How many history entries `get_scheduler_status` includes.
pub const RECENT_COMPLETED: usize = 10;
pub const RECENT_FAILED: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub recurring: bool,
    pub interval_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub attempts: u32,
    pub last_result: Option<Payload>,
    pub last_error: Option<FailureReason>,
    pub pending_removal: bool,
}

impl From<&TaskRecord> for TaskStatusView {
    fn from(r: &TaskRecord) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            status: r.status,
            priority: r.priority,
            recurring: r.schedule.is_recurring(),
            interval_ms: r.schedule.interval().map(as_millis),
            created_at: r.created_at,
            last_run_at: r.last_run_at,
            // terminal tasks have nothing scheduled
            next_run_at: (!r.status.is_terminal()).then_some(r.next_run_at),
            retry_count: r.retry_count,
            max_retries: r.max_retries,
            attempts: r.attempts,
            last_result: r.last_result.clone(),
            last_error: r.last_error.clone(),
            pending_removal: r.pending_removal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskStatistics {
    pub fn count<'a>(records: impl IntoIterator<Item = &'a TaskRecord>) -> Self {
        let mut stats = Self::default();
        for r in records {
            match r.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

/// Lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_scheduled: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_retries: u64,
    pub total_timed_out: u64,

    /// Mean duration of successful runs.
    pub average_execution_ms: f64,
}

impl Metrics {
    pub fn record_success(&mut self, duration: Duration) {
        self.total_completed += 1;
        let n = self.total_completed as f64;
        let ms = duration.as_secs_f64() * 1000.0;
        self.average_execution_ms += (ms - self.average_execution_ms) / n;
    }

    pub fn record_failure(&mut self, reason: &FailureReason, retried: bool) {
        self.total_failed += 1;
        if retried {
            self.total_retries += 1;
        }
        if matches!(reason, FailureReason::TimedOut(_)) {
            self.total_timed_out += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// True while the polling loop is active.
    pub running: bool,
    pub lifecycle: LoopState,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_seconds: f64,
    pub total_tasks: usize,
    pub task_statistics: TaskStatistics,
    pub metrics: Metrics,
    pub due_queue_size: usize,
    pub in_flight: usize,
    pub next_due_at: Option<DateTime<Utc>>,
    pub recent_completed: Vec<ExecutionRecord>,
    pub recent_failed: Vec<ExecutionRecord>,
    pub timestamp: DateTime<Utc>,
}

/// What one poll cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Dispatched, in dispatch order.
    pub dispatched: Vec<TaskId>,

    /// Due but left queued because no execution slot was free.
    pub deferred: Vec<TaskId>,
}

/// Result of `stop()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Runs that finished during the drain.
    pub drained: usize,

    /// Still running when the drain timeout elapsed. They were not aborted.
    pub abandoned: Vec<TaskId>,
}

fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_running_mean_of_successes() {
        let mut m = Metrics::default();
        m.record_success(Duration::from_millis(100));
        m.record_success(Duration::from_millis(300));
        m.record_failure(&FailureReason::Action("x".into()), true);
        assert_eq!(m.total_completed, 2);
        assert_eq!(m.total_failed, 1);
        assert_eq!(m.total_retries, 1);
        assert!((m.average_execution_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn timeouts_are_counted_separately() {
        let mut m = Metrics::default();
        m.record_failure(&FailureReason::TimedOut(Duration::from_secs(1)), false);
        assert_eq!(m.total_timed_out, 1);
        assert_eq!(m.total_retries, 0);
    }
}
