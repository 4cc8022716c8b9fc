//! TaskAction port - 呼び出し側が渡す「実行単位」
//!
//! スケジューラは action の中身を一切見ません。`execute` を呼び、
//! `Payload` か `ActionError` を受け取るだけです。
//!
//! # 実装
//! - trait を直接実装する（状態を持つ action 向け）
//! - [`action_fn`] でクロージャをラップする

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{ActionError, Payload, TaskId};

/// Per-run context handed to an action.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub task_id: TaskId,
    pub task_name: String,

    /// 1-based execution count of this task (includes retries).
    pub attempt: u32,

    /// Retries already consumed in the current cycle.
    pub retry_count: u32,

    pub cancel: CancelSignal,
}

/// Cooperative cancellation signal.
///
/// Fires when the task is cancelled while running. The scheduler never
/// interrupts a run because of cancellation; the action decides.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the task is cancelled.
    /// Never resolves if the owning task record is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // sender dropped without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

/// A unit of schedulable work.
///
/// # 使用例
/// ```ignore
/// struct Heartbeat;
///
/// #[async_trait]
/// impl TaskAction for Heartbeat {
///     async fn execute(&self, ctx: ActionContext) -> Result<Payload, ActionError> {
///         Ok(Payload::new(format!("alive (attempt {})", ctx.attempt)))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskAction: Send + Sync {
    async fn execute(&self, ctx: ActionContext) -> Result<Payload, ActionError>;
}

/// Closure adapter for [`TaskAction`].
pub struct FnAction<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> TaskAction for FnAction<F>
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Payload, ActionError>> + Send + 'static,
{
    async fn execute(&self, ctx: ActionContext) -> Result<Payload, ActionError> {
        (self.f)(ctx).await
    }
}

/// Wrap a closure returning a future as a shareable action.
///
/// ```ignore
/// let action = action_fn(|ctx| async move {
///     Ok(Payload::new(format!("ran {}", ctx.task_name)))
/// });
/// ```
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn TaskAction>
where
    F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Payload, ActionError>> + Send + 'static,
{
    Arc::new(FnAction { f })
}
