//! Task registry: the single source of truth for task records.

use std::collections::HashMap;

use crate::domain::{TaskId, TaskStatus};

use super::TaskRecord;

/// What `remove` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,

    /// The task is running; it will be dropped once the run finishes.
    Deferred,

    Absent,
}

impl Removal {
    pub fn found(self) -> bool {
        !matches!(self, Removal::Absent)
    }
}

/// Records keyed by id; listing follows insertion order (`seq`).
#[derive(Debug, Default)]
pub struct TaskRegistry {
    records: HashMap<TaskId, TaskRecord>,
    next_seq: u64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the insertion sequence for the next record.
    pub fn allocate_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Insert a validated record and return its id.
    pub fn register(&mut self, record: TaskRecord) -> TaskId {
        let id = record.id;
        self.records.insert(id, record);
        id
    }

    pub fn get(&self, task_id: TaskId) -> Option<&TaskRecord> {
        self.records.get(&task_id)
    }

    pub fn get_mut(&mut self, task_id: TaskId) -> Option<&mut TaskRecord> {
        self.records.get_mut(&task_id)
    }

    /// Remove a record. A running record is only marked and dropped later
    /// (see [`TaskRegistry::reap`]); execution is not interrupted.
    pub fn remove(&mut self, task_id: TaskId) -> Removal {
        match self.records.get_mut(&task_id) {
            None => Removal::Absent,
            Some(record) if record.is_in_run() => {
                record.pending_removal = true;
                Removal::Deferred
            }
            Some(_) => {
                self.records.remove(&task_id);
                Removal::Removed
            }
        }
    }

    /// Drop a record whose deferred removal is due. Returns true if dropped.
    pub fn reap(&mut self, task_id: TaskId) -> bool {
        let due = self
            .records
            .get(&task_id)
            .is_some_and(|r| r.pending_removal && !r.is_in_run());
        if due {
            self.records.remove(&task_id);
        }
        due
    }

    /// Records in insertion order, optionally filtered by status.
    pub fn list(&self, status: Option<TaskStatus>) -> Vec<&TaskRecord> {
        let mut out: Vec<&TaskRecord> = self
            .records
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect();
        out.sort_by_key(|r| r.seq);
        out
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decision, Payload, RunOutcome, TaskSpec};
    use crate::ports::action_fn;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn insert(reg: &mut TaskRegistry, name: &str) -> TaskId {
        let seq = reg.allocate_seq();
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        reg.register(TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            TaskSpec::once(name),
            action_fn(|_ctx| async { Ok(Payload::empty()) }),
            created,
            seq,
        ))
    }

    #[test]
    fn list_preserves_insertion_order() {
        let mut reg = TaskRegistry::new();
        let names = ["c", "a", "b", "a"];
        for name in names {
            insert(&mut reg, name);
        }
        let listed: Vec<&str> = reg.list(None).iter().map(|r| r.name.as_str()).collect();
        assert_eq!(listed, names);
    }

    #[test]
    fn list_filters_by_status() {
        let mut reg = TaskRegistry::new();
        let a = insert(&mut reg, "a");
        insert(&mut reg, "b");
        reg.get_mut(a).unwrap().cancel();

        let cancelled = reg.list(Some(TaskStatus::Cancelled));
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, a);
        assert_eq!(reg.list(Some(TaskStatus::Pending)).len(), 1);
    }

    #[test]
    fn remove_running_is_deferred_until_reaped() {
        let mut reg = TaskRegistry::new();
        let a = insert(&mut reg, "a");
        reg.get_mut(a).unwrap().start_run(Utc::now());

        assert_eq!(reg.remove(a), Removal::Deferred);
        assert!(reg.get(a).is_some());
        assert!(!reg.reap(a));

        finish(&mut reg, a);
        assert!(reg.reap(a));
        assert!(reg.get(a).is_none());
    }

    #[test]
    fn cancelled_mid_run_is_still_deferred() {
        let mut reg = TaskRegistry::new();
        let a = insert(&mut reg, "a");
        let record = reg.get_mut(a).unwrap();
        record.start_run(Utc::now());
        record.cancel();

        assert_eq!(reg.remove(a), Removal::Deferred);
        assert!(!reg.reap(a));

        finish(&mut reg, a);
        assert_eq!(reg.get(a).unwrap().status, TaskStatus::Cancelled);
        assert!(reg.reap(a));
    }

    fn finish(reg: &mut TaskRegistry, id: TaskId) {
        reg.get_mut(id).unwrap().finish_run(
            RunOutcome::Succeeded(Payload::empty()),
            Decision::Complete,
            Utc::now(),
        );
    }

    #[test]
    fn remove_absent_reports_false() {
        let mut reg = TaskRegistry::new();
        let a = insert(&mut reg, "a");
        assert!(reg.remove(a).found());
        assert!(!reg.remove(a).found());
        assert!(reg.is_empty());
    }
}
