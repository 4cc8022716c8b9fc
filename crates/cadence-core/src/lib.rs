//! cadence-core
//!
//! In-process recurring task scheduler.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, state, outcome, decision, errors）
//! - **ports**: 抽象化レイヤー（TaskAction, Clock, IdGenerator, HistorySink）
//! - **queue**: task record / registry / due queue / retry policy
//! - **app**: scheduler 本体（builder, poll loop, executor, history, status）

pub mod app;
pub mod domain;
pub mod ports;
pub mod queue;

pub use app::{Scheduler, SchedulerBuilder, SchedulerConfig};
pub use domain::{
    ActionError, FailureReason, Payload, Priority, ScheduleKind, SchedulerError, TaskId, TaskSpec,
    TaskStatus,
};
pub use ports::{ActionContext, TaskAction, action_fn};
