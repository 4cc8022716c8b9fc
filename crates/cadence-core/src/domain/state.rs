//! Task status state machine.

use serde::{Deserialize, Serialize};

/// Task status.
///
/// State transitions:
/// - Pending -> Running -> Completed (one-shot, terminal)
/// - Pending -> Running -> Pending (recurring, next interval)
/// - Pending -> Running -> Pending (retry with backoff)
/// - Pending -> Running -> Failed (one-shot, retry budget exhausted)
/// - Pending | Running -> Cancelled (terminal, never left)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the due queue.
    Pending,

    /// An execution is in flight.
    Running,

    /// One-shot task finished successfully.
    Completed,

    /// One-shot task exhausted its retry budget.
    Failed,

    /// Cancelled by a caller.
    Cancelled,
}

impl TaskStatus {
    /// No further scheduling will happen from this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Eligible for dispatch once due.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, TaskStatus::Pending)
    }
}

/// Lifecycle of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Stopped,
    Running,

    /// `stop()` in progress: in-flight runs finish, nothing new is dispatched.
    Draining,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Pending, false)]
    #[case(TaskStatus::Running, false)]
    #[case(TaskStatus::Completed, true)]
    #[case(TaskStatus::Failed, true)]
    #[case(TaskStatus::Cancelled, true)]
    fn terminal_states(#[case] status: TaskStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn only_pending_is_dispatchable() {
        assert!(TaskStatus::Pending.is_dispatchable());
        assert!(!TaskStatus::Running.is_dispatchable());
        assert!(!TaskStatus::Cancelled.is_dispatchable());
    }
}
