//! Errors - 呼び出し側に同期的に返すエラー
//!
//! タスク自身の action の失敗はここには含めません（`FailureReason` として状態に記録する）。

use thiserror::Error;

use super::ids::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("invalid task definition: {0}")]
    InvalidTaskDefinition(String),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("task already cancelled: {0}")]
    AlreadyCancelled(TaskId),

    #[error("scheduler is stopped; new work is rejected")]
    SchedulerStopped,

    #[error("scheduler loop is already running")]
    AlreadyRunning,
}
