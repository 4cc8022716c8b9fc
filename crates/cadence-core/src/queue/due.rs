//! Due-time queue.
//!
//! Entries are ordered by (next_run_at asc, priority desc, seq asc), so the
//! dispatch order of equally-due tasks is deterministic.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::domain::{Priority, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DueEntry {
    next_run_at: DateTime<Utc>,
    priority: Priority,
    seq: u64,
    task_id: TaskId,
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.next_run_at
            .cmp(&other.next_run_at)
            // higher priority first
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| self.seq.cmp(&other.seq))
            .then_with(|| self.task_id.cmp(&other.task_id))
    }
}

/// Ordered set of pending tasks keyed by due time.
///
/// Holds TaskId only. At most one entry per task: scheduling a task that is
/// already queued replaces its previous entry.
#[derive(Debug, Default)]
pub struct DueQueue {
    entries: BTreeSet<DueEntry>,
    index: HashMap<TaskId, DueEntry>,
}

impl DueQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or move `task_id` to `next_run_at`.
    pub fn schedule(
        &mut self,
        task_id: TaskId,
        next_run_at: DateTime<Utc>,
        priority: Priority,
        seq: u64,
    ) {
        let entry = DueEntry {
            next_run_at,
            priority,
            seq,
            task_id,
        };
        if let Some(previous) = self.index.insert(task_id, entry) {
            self.entries.remove(&previous);
        }
        self.entries.insert(entry);
    }

    /// Drop a task from tracking. Returns true if it was queued.
    pub fn remove(&mut self, task_id: TaskId) -> bool {
        match self.index.remove(&task_id) {
            Some(entry) => {
                self.entries.remove(&entry);
                true
            }
            None => false,
        }
    }

    /// Remove a task at dispatch time (same as `remove`, named for intent).
    pub fn take(&mut self, task_id: TaskId) -> bool {
        self.remove(task_id)
    }

    /// All tasks with `next_run_at <= now`, in dispatch order. Non-destructive.
    pub fn peek_due(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        self.entries
            .iter()
            .take_while(|entry| entry.next_run_at <= now)
            .map(|entry| entry.task_id)
            .collect()
    }

    /// Earliest due time, if anything is queued.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.entries.first().map(|entry| entry.next_run_at)
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.index.contains_key(&task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
