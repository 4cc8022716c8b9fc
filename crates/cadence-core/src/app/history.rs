//! Bounded in-memory execution history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::HistoryLimits;
use crate::domain::{FailureReason, RunId, TaskId};

/// One finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub name: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    Succeeded {
        /// Truncated payload, `None` if the action returned an empty one.
        preview: Option<String>,
    },
    Failed {
        reason: FailureReason,
        /// Retry count after this failure was handled.
        retry_count: u32,
        /// True if no further attempt is scheduled for this cycle.
        exhausted: bool,
    },
}

impl ExecutionRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.result, ExecutionResult::Succeeded { .. })
    }
}

/// Most-recent-N successes and failures, kept separately.
#[derive(Debug)]
pub struct ExecutionHistory {
    limits: HistoryLimits,
    successes: VecDeque<ExecutionRecord>,
    failures: VecDeque<ExecutionRecord>,
}

impl ExecutionHistory {
    pub fn new(limits: HistoryLimits) -> Self {
        Self {
            successes: VecDeque::with_capacity(limits.successes),
            failures: VecDeque::with_capacity(limits.failures),
            limits,
        }
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        let (buf, cap) = if record.is_success() {
            (&mut self.successes, self.limits.successes)
        } else {
            (&mut self.failures, self.limits.failures)
        };
        if cap == 0 {
            return;
        }
        while buf.len() >= cap {
            buf.pop_front();
        }
        buf.push_back(record);
    }

    /// Up to `n` most recent successes, oldest first.
    pub fn recent_successes(&self, n: usize) -> Vec<ExecutionRecord> {
        tail(&self.successes, n)
    }

    /// Up to `n` most recent failures, oldest first.
    pub fn recent_failures(&self, n: usize) -> Vec<ExecutionRecord> {
        tail(&self.failures, n)
    }

    /// All retained records of one task, oldest first.
    pub fn for_task(&self, task_id: TaskId) -> Vec<ExecutionRecord> {
        let mut out: Vec<ExecutionRecord> = self
            .successes
            .iter()
            .chain(self.failures.iter())
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.finished_at, r.run_id));
        out
    }

    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

fn tail(buf: &VecDeque<ExecutionRecord>, n: usize) -> Vec<ExecutionRecord> {
    buf.iter().skip(buf.len().saturating_sub(n)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn entry(task_id: TaskId, ok: bool, n: i64) -> ExecutionRecord {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(n);
        ExecutionRecord {
            run_id: RunId::from_ulid(Ulid::new()),
            task_id,
            name: "job".to_string(),
            attempt: 1,
            started_at: at,
            finished_at: at,
            duration_ms: 0,
            result: if ok {
                ExecutionResult::Succeeded { preview: None }
            } else {
                ExecutionResult::Failed {
                    reason: FailureReason::Action(format!("fail {n}")),
                    retry_count: 0,
                    exhausted: false,
                }
            },
        }
    }

    #[test]
    fn keeps_most_recent_per_kind() {
        let mut h = ExecutionHistory::new(HistoryLimits {
            successes: 3,
            failures: 2,
        });
        let id = TaskId::from_ulid(Ulid::new());
        for n in 0..10 {
            h.push(entry(id, true, n));
            h.push(entry(id, false, n));
        }
        assert_eq!(h.success_count(), 3);
        assert_eq!(h.failure_count(), 2);

        let recent = h.recent_failures(5);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].finished_at, entry(id, false, 9).finished_at);
    }

    #[test]
    fn recent_returns_tail_oldest_first() {
        let mut h = ExecutionHistory::new(HistoryLimits::default());
        let id = TaskId::from_ulid(Ulid::new());
        for n in 0..4 {
            h.push(entry(id, true, n));
        }
        let recent = h.recent_successes(2);
        assert!(recent[0].finished_at < recent[1].finished_at);
        assert_eq!(recent[1].finished_at, entry(id, true, 3).finished_at);
    }

    #[test]
    fn for_task_filters_and_merges() {
        let mut h = ExecutionHistory::new(HistoryLimits::default());
        let (a, b) = (
            TaskId::from_ulid(Ulid::new()),
            TaskId::from_ulid(Ulid::new()),
        );
        h.push(entry(a, false, 1));
        h.push(entry(b, true, 2));
        h.push(entry(a, true, 3));

        let runs = h.for_task(a);
        assert_eq!(runs.len(), 2);
        assert!(!runs[0].is_success());
        assert!(runs[1].is_success());
    }
}
