//! Executor - 1 回分の実行
//!
//! # フロー
//! 1. action を独立した tokio task で実行（panic を JoinError として捕捉）
//! 2. timeout があれば `tokio::time::timeout` で打ち切り、inner task を abort
//! 3. Decider で次の状態を決定
//! 4. 状態ロック下で record / due queue / history / metrics を更新
//! 5. ロック解放後に HistorySink へ通知
//!
//! action の await 中はロックを持たない。

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinError;
use tokio::time::Instant;

use super::history::{ExecutionRecord, ExecutionResult};
use super::scheduler::Shared;
use crate::domain::{ActionError, Decision, FailureReason, Payload, RunOutcome, TaskId};
use crate::ports::{ActionContext, TaskAction};

/// Everything a run needs, captured at dispatch time under the state lock.
pub(crate) struct Launch {
    pub task_id: TaskId,
    pub name: String,
    pub action: Arc<dyn TaskAction>,
    pub ctx: ActionContext,
    pub timeout: Option<Duration>,
    pub started_at: DateTime<Utc>,

    /// Held for the whole run when concurrency is bounded.
    pub permit: Option<OwnedSemaphorePermit>,
}

/// Run one dispatched task to completion and fold the outcome back in.
pub(crate) async fn execute(shared: Arc<Shared>, launch: Launch) {
    let Launch {
        task_id,
        name,
        action,
        ctx,
        timeout,
        started_at,
        permit,
    } = launch;
    let attempt = ctx.attempt;

    tracing::debug!(task_id = %task_id, name = %name, attempt, "run started");

    let clock_start = Instant::now();
    let outcome = run_action(action, ctx, timeout).await;
    let elapsed = clock_start.elapsed();
    let finished_at = shared.clock.now();

    // slot is free as soon as the action is done
    drop(permit);

    let run_id = shared.ids.generate_run_id();
    let entry = {
        let mut state = shared.state.lock().await;
        let state = &mut *state;
        state.in_flight.remove(&task_id);

        let Some(record) = state.registry.get_mut(task_id) else {
            tracing::warn!(task_id = %task_id, "finished run has no record");
            shared.idle.notify_waiters();
            return;
        };

        let decision = shared.decider.decide(record, &outcome, finished_at);
        let retried = matches!(decision, Decision::Retry { .. });
        let exhausted = !retried && !outcome.is_success();

        let result = match &outcome {
            RunOutcome::Succeeded(payload) => {
                state.metrics.record_success(elapsed);
                ExecutionResult::Succeeded {
                    preview: preview(payload, shared.config.result_preview_chars),
                }
            }
            RunOutcome::Failed(reason) => {
                state.metrics.record_failure(reason, retried);
                ExecutionResult::Failed {
                    reason: reason.clone(),
                    retry_count: match decision {
                        Decision::Retry { retry_count, .. } => retry_count,
                        _ => record.retry_count,
                    },
                    exhausted,
                }
            }
        };

        log_outcome(task_id, &name, attempt, elapsed, &outcome, &decision);

        let (priority, seq) = (record.priority, record.seq);
        if let Some(next_run_at) = record.finish_run(outcome, decision, finished_at) {
            state.due.schedule(task_id, next_run_at, priority, seq);
        }

        if state.registry.reap(task_id) {
            state.due.remove(task_id);
            tracing::info!(task_id = %task_id, name = %name, "removed after run");
        }

        let entry = ExecutionRecord {
            run_id,
            task_id,
            name,
            attempt,
            started_at,
            finished_at,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            result,
        };
        state.history.push(entry.clone());

        if state.in_flight.is_empty() {
            shared.idle.notify_waiters();
        }
        entry
    };

    shared.sink.record(&entry);
}

async fn run_action(
    action: Arc<dyn TaskAction>,
    ctx: ActionContext,
    timeout: Option<Duration>,
) -> RunOutcome {
    let mut handle = tokio::spawn(async move { action.execute(ctx).await });

    let joined = match timeout {
        None => (&mut handle).await,
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                // stop the action at its next await point
                handle.abort();
                return RunOutcome::Failed(FailureReason::TimedOut(limit));
            }
        },
    };

    into_outcome(joined)
}

fn into_outcome(joined: Result<Result<Payload, ActionError>, JoinError>) -> RunOutcome {
    match joined {
        Ok(Ok(payload)) => RunOutcome::Succeeded(payload),
        Ok(Err(err)) => RunOutcome::Failed(err.into()),
        Err(err) if err.is_panic() => {
            RunOutcome::Failed(FailureReason::Panicked(panic_message(err.into_panic())))
        }
        Err(_) => RunOutcome::Failed(FailureReason::Action("run was aborted".to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn preview(payload: &Payload, max_chars: usize) -> Option<String> {
    (!payload.is_empty()).then(|| payload.preview(max_chars))
}

fn log_outcome(
    task_id: TaskId,
    name: &str,
    attempt: u32,
    elapsed: Duration,
    outcome: &RunOutcome,
    decision: &Decision,
) {
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    match (outcome, decision) {
        (RunOutcome::Succeeded(_), _) => {
            tracing::info!(
                task_id = %task_id,
                name = %name,
                attempt,
                duration_ms,
                "task completed"
            );
        }
        (
            RunOutcome::Failed(reason),
            Decision::Retry {
                retry_count, delay, ..
            },
        ) => {
            tracing::warn!(
                task_id = %task_id,
                name = %name,
                attempt,
                retry_count,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %reason,
                "task failed, retry scheduled"
            );
        }
        (RunOutcome::Failed(reason), Decision::Reschedule { next_run_at }) => {
            tracing::error!(
                task_id = %task_id,
                name = %name,
                attempt,
                error = %reason,
                next_run_at = %next_run_at,
                "retries exhausted, waiting for next interval"
            );
        }
        (RunOutcome::Failed(reason), _) => {
            tracing::error!(
                task_id = %task_id,
                name = %name,
                attempt,
                error = %reason,
                "task failed permanently"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{CancelSignal, action_fn};
    use ulid::Ulid;

    fn ctx() -> ActionContext {
        ActionContext {
            task_id: TaskId::from_ulid(Ulid::new()),
            task_name: "job".to_string(),
            attempt: 1,
            retry_count: 0,
            cancel: CancelSignal::never(),
        }
    }

    #[tokio::test]
    async fn success_passes_payload_through() {
        let action = action_fn(|_ctx| async { Ok(Payload::new("done")) });
        let outcome = run_action(action, ctx(), None).await;
        assert_eq!(outcome, RunOutcome::Succeeded(Payload::new("done")));
    }

    #[tokio::test]
    async fn action_error_becomes_failure() {
        let action = action_fn(|_ctx| async { Err(ActionError::new("boom")) });
        let outcome = run_action(action, ctx(), None).await;
        assert_eq!(
            outcome,
            RunOutcome::Failed(FailureReason::Action("boom".to_string()))
        );
    }

    #[tokio::test]
    async fn panic_is_captured() {
        let action = action_fn(|_ctx| async {
            if true {
                panic!("kaboom");
            }
            Ok(Payload::empty())
        });
        let outcome = run_action(action, ctx(), None).await;
        assert_eq!(
            outcome,
            RunOutcome::Failed(FailureReason::Panicked("kaboom".to_string()))
        );
    }

    #[tokio::test]
    async fn slow_action_times_out() {
        let action = action_fn(|_ctx| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Payload::empty())
        });
        let limit = Duration::from_millis(20);
        let outcome = run_action(action, ctx(), Some(limit)).await;
        assert_eq!(outcome, RunOutcome::Failed(FailureReason::TimedOut(limit)));
    }

    #[test]
    fn empty_payload_has_no_preview() {
        assert_eq!(preview(&Payload::empty(), 10), None);
        assert_eq!(
            preview(&Payload::new("abcdefghijkl"), 4),
            Some("abcd".to_string())
        );
    }
}
