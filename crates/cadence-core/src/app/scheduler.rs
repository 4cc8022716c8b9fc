//! Scheduler - 公開 API とポーリングループ
//!
//! # 構成
//! - 状態（registry / due queue / history / metrics / lifecycle）は 1 つの tokio Mutex の下
//! - poll cycle: due なタスクを取り出して Running にし、executor を spawn
//! - 実行中はロックを持たない（action の await はロック外）
//!
//! # ライフサイクル
//! Stopped --start--> Running --stop--> Draining --> Stopped

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, Semaphore, watch};
use tokio::task::JoinHandle;

use super::builder::{BuildError, SchedulerBuilder};
use super::config::{SchedulerConfig, StoppedPolicy};
use super::executor::{self, Launch};
use super::history::{ExecutionHistory, ExecutionRecord};
use super::status::{
    CycleReport, DrainReport, Metrics, RECENT_COMPLETED, RECENT_FAILED, SchedulerStatus,
    TaskStatistics, TaskStatusView,
};
use crate::domain::{Decider, LoopState, SchedulerError, TaskId, TaskSpec, TaskStatus};
use crate::ports::{Clock, HistorySink, IdGenerator, TaskAction};
use crate::queue::{DueQueue, Removal, TaskRecord, TaskRegistry};

/// Dependencies and state shared by the handle, the loop and every run.
pub(crate) struct Shared {
    pub config: SchedulerConfig,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub decider: Arc<dyn Decider>,
    pub sink: Arc<dyn HistorySink>,

    /// `None` = unbounded.
    pub slots: Option<Arc<Semaphore>>,

    pub state: Mutex<SchedulerState>,

    /// Signalled when the last in-flight run finishes.
    pub idle: Notify,
}

pub(crate) struct SchedulerState {
    pub registry: TaskRegistry,
    pub due: DueQueue,
    pub history: ExecutionHistory,
    pub metrics: Metrics,
    pub lifecycle: LoopState,
    pub started_at: Option<DateTime<Utc>>,

    /// Tasks whose run has been dispatched and not yet folded back.
    pub in_flight: HashSet<TaskId>,

    control: Option<LoopControl>,
}

struct LoopControl {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Handle to a scheduler instance. Cheap to clone; all clones share state.
///
/// # 使用例
/// ```ignore
/// let scheduler = Scheduler::builder().config(config).build()?;
/// let id = scheduler
///     .schedule_recurring("heartbeat", action, Duration::from_secs(60))
///     .await?;
/// scheduler.start().await?;
/// // ...
/// let report = scheduler.stop(None).await;
/// ```
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Build with the given config and default ports.
    pub fn new(config: SchedulerConfig) -> Result<Self, BuildError> {
        SchedulerBuilder::new().config(config).build()
    }

    pub(crate) fn assemble(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        decider: Arc<dyn Decider>,
        sink: Arc<dyn HistorySink>,
    ) -> Self {
        let state = SchedulerState {
            registry: TaskRegistry::new(),
            due: DueQueue::new(),
            history: ExecutionHistory::new(config.history.clone()),
            metrics: Metrics::default(),
            lifecycle: LoopState::Stopped,
            started_at: None,
            in_flight: HashSet::new(),
            control: None,
        };
        let slots = config.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        Self {
            shared: Arc::new(Shared {
                config,
                clock,
                ids,
                decider,
                sink,
                slots,
                state: Mutex::new(state),
                idle: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    // ------------------------------------------------------------------
    // registration
    // ------------------------------------------------------------------

    /// Register a task. It becomes due at `spec.starting_at` (or now).
    pub async fn schedule(
        &self,
        spec: TaskSpec,
        action: Arc<dyn TaskAction>,
    ) -> Result<TaskId, SchedulerError> {
        spec.validate()?;

        let mut state = self.shared.state.lock().await;
        if self.shared.config.when_stopped == StoppedPolicy::Reject
            && state.lifecycle != LoopState::Running
        {
            return Err(SchedulerError::SchedulerStopped);
        }

        let now = self.shared.clock.now();
        let id = self.shared.ids.generate_task_id();
        let seq = state.registry.allocate_seq();
        let record = TaskRecord::new(id, spec, action, now, seq);

        tracing::info!(
            task_id = %id,
            name = %record.name,
            priority = %record.priority,
            recurring = record.schedule.is_recurring(),
            next_run_at = %record.next_run_at,
            "task scheduled"
        );

        state
            .due
            .schedule(id, record.next_run_at, record.priority, seq);
        state.registry.register(record);
        state.metrics.total_scheduled += 1;
        Ok(id)
    }

    /// Recurring task with default priority and retries, first run now.
    pub async fn schedule_recurring(
        &self,
        name: impl Into<String>,
        action: Arc<dyn TaskAction>,
        interval: Duration,
    ) -> Result<TaskId, SchedulerError> {
        self.schedule(TaskSpec::recurring(name, interval), action)
            .await
    }

    /// One-shot task at `at`; `None` or a past time runs at the next poll.
    pub async fn schedule_once(
        &self,
        name: impl Into<String>,
        action: Arc<dyn TaskAction>,
        at: Option<DateTime<Utc>>,
    ) -> Result<TaskId, SchedulerError> {
        let mut spec = TaskSpec::once(name);
        if let Some(at) = at {
            spec = spec.starting_at(at);
        }
        self.schedule(spec, action).await
    }

    /// Cancel a task.
    ///
    /// - `Ok(true)`: was Pending or Running, now Cancelled
    /// - `Ok(false)`: already Completed/Failed, nothing changed
    ///
    /// A running action is not interrupted; it sees `ctx.cancel` fire and its
    /// outcome is recorded without rescheduling.
    pub async fn cancel(&self, task_id: TaskId) -> Result<bool, SchedulerError> {
        let mut state = self.shared.state.lock().await;
        let SchedulerState { registry, due, .. } = &mut *state;
        let record = registry
            .get_mut(task_id)
            .ok_or(SchedulerError::NotFound(task_id))?;

        match record.status {
            TaskStatus::Cancelled => Err(SchedulerError::AlreadyCancelled(task_id)),
            TaskStatus::Completed | TaskStatus::Failed => Ok(false),
            TaskStatus::Pending | TaskStatus::Running => {
                let was_running = record.status == TaskStatus::Running;
                record.cancel();
                due.remove(task_id);
                tracing::info!(
                    task_id = %task_id,
                    name = %record.name,
                    was_running,
                    "task cancelled"
                );
                Ok(true)
            }
        }
    }

    /// Drop a task entirely. A running task is dropped once its run ends.
    /// Returns false if the id is unknown.
    pub async fn remove(&self, task_id: TaskId) -> bool {
        let mut state = self.shared.state.lock().await;
        let removal = state.registry.remove(task_id);
        match removal {
            Removal::Removed => {
                state.due.remove(task_id);
                tracing::info!(task_id = %task_id, "task removed");
            }
            Removal::Deferred => {
                tracing::info!(task_id = %task_id, "task running; removal deferred");
            }
            Removal::Absent => {}
        }
        removal.found()
    }

    /// Read a task's status and drop it if it is finished for good
    /// (a one-shot that Completed or Failed, or anything Cancelled).
    /// A task whose run is still in flight is kept until the run ends.
    pub async fn acknowledge(&self, task_id: TaskId) -> Result<TaskStatusView, SchedulerError> {
        let mut state = self.shared.state.lock().await;
        let record = state
            .registry
            .get(task_id)
            .ok_or(SchedulerError::NotFound(task_id))?;
        let view = TaskStatusView::from(record);
        if record.is_removable() {
            state.registry.remove(task_id);
            state.due.remove(task_id);
            tracing::debug!(
                task_id = %task_id,
                status = ?view.status,
                "finished task acknowledged"
            );
        }
        Ok(view)
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    pub async fn get_status(&self, task_id: TaskId) -> Result<TaskStatusView, SchedulerError> {
        let state = self.shared.state.lock().await;
        state
            .registry
            .get(task_id)
            .map(TaskStatusView::from)
            .ok_or(SchedulerError::NotFound(task_id))
    }

    /// Tasks in registration order, optionally filtered by status.
    pub async fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<TaskStatusView> {
        let state = self.shared.state.lock().await;
        state
            .registry
            .list(status)
            .into_iter()
            .map(TaskStatusView::from)
            .collect()
    }

    /// Retained runs of one task, oldest first.
    pub async fn history(&self, task_id: TaskId) -> Vec<ExecutionRecord> {
        self.shared.state.lock().await.history.for_task(task_id)
    }

    pub async fn get_scheduler_status(&self) -> SchedulerStatus {
        let state = self.shared.state.lock().await;
        let now = self.shared.clock.now();
        let running = state.lifecycle == LoopState::Running;
        let uptime_seconds = match (running, state.started_at) {
            (true, Some(started)) => ((now - started).num_milliseconds().max(0) as f64) / 1000.0,
            _ => 0.0,
        };

        SchedulerStatus {
            running,
            lifecycle: state.lifecycle,
            started_at: state.started_at,
            uptime_seconds,
            total_tasks: state.registry.len(),
            task_statistics: TaskStatistics::count(state.registry.iter()),
            metrics: state.metrics.clone(),
            due_queue_size: state.due.len(),
            in_flight: state.in_flight.len(),
            next_due_at: state.due.next_due(),
            recent_completed: state.history.recent_successes(RECENT_COMPLETED),
            recent_failed: state.history.recent_failures(RECENT_FAILED),
            timestamp: now,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.shared.state.lock().await.lifecycle == LoopState::Running
    }

    // ------------------------------------------------------------------
    // dispatch
    // ------------------------------------------------------------------

    /// Run one poll cycle: dispatch every due task, in due order.
    ///
    /// Usable without `start()` (tests, external drivers). Dispatches
    /// nothing while draining.
    pub async fn poll_once(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let mut state = self.shared.state.lock().await;
        if state.lifecycle == LoopState::Draining {
            return report;
        }

        let now = self.shared.clock.now();
        let state = &mut *state;
        for task_id in state.due.peek_due(now) {
            let Some(record) = state.registry.get_mut(task_id) else {
                state.due.remove(task_id);
                continue;
            };
            if !record.is_due(now) {
                // stale entry for a task that is no longer Pending
                state.due.remove(task_id);
                continue;
            }

            let permit = match &self.shared.slots {
                None => None,
                Some(slots) => match Arc::clone(slots).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        report.deferred.push(task_id);
                        continue;
                    }
                },
            };

            state.due.take(task_id);
            let ctx = record.start_run(now);
            state.in_flight.insert(task_id);

            let launch = Launch {
                task_id,
                name: record.name.clone(),
                action: Arc::clone(&record.action),
                ctx,
                timeout: record.timeout,
                started_at: now,
                permit,
            };
            tokio::spawn(executor::execute(Arc::clone(&self.shared), launch));
            report.dispatched.push(task_id);
        }

        if !report.deferred.is_empty() {
            tracing::debug!(
                deferred = report.deferred.len(),
                "no free execution slot; due tasks left queued"
            );
        }
        report
    }

    /// Wait until no run is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.state.lock().await.in_flight.is_empty() {
                return;
            }
            notified.await;
        }
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// Start the polling loop. Returns immediately.
    ///
    /// Fails with `AlreadyRunning` unless the scheduler is Stopped. That
    /// includes Draining: a `stop` in progress must return before the loop
    /// can be started again.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.shared.state.lock().await;
        if state.lifecycle != LoopState::Stopped {
            return Err(SchedulerError::AlreadyRunning);
        }
        state.lifecycle = LoopState::Running;
        state.started_at = Some(self.shared.clock.now());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(poll_loop(self.clone(), shutdown_rx));
        state.control = Some(LoopControl { shutdown_tx, join });

        tracing::info!(
            poll_interval_ms = u64::try_from(self.shared.config.poll_interval.as_millis())
                .unwrap_or(u64::MAX),
            max_concurrency = ?self.shared.config.max_concurrency,
            tasks = state.registry.len(),
            "scheduler started"
        );
        Ok(())
    }

    /// Stop dispatching and wait for in-flight runs, at most `drain_timeout`
    /// (`None` = the configured default).
    ///
    /// Runs still going at the deadline are left running and reported as
    /// abandoned. Calling `stop` on a scheduler that is not running is a no-op.
    pub async fn stop(&self, drain_timeout: Option<Duration>) -> DrainReport {
        let (control, in_flight) = {
            let mut state = self.shared.state.lock().await;
            if state.lifecycle != LoopState::Running {
                return DrainReport::default();
            }
            state.lifecycle = LoopState::Draining;
            (state.control.take(), state.in_flight.len())
        };
        tracing::info!(in_flight, "scheduler stopping");

        if let Some(control) = control {
            control.shutdown_tx.send_replace(true);
            if let Err(err) = control.join.await {
                tracing::error!(error = %err, "poll loop ended abnormally");
            }
        }

        let limit = drain_timeout.unwrap_or(self.shared.config.drain_timeout);
        let drained_in_time = tokio::time::timeout(limit, self.wait_idle())
            .await
            .is_ok();

        let mut state = self.shared.state.lock().await;
        let mut abandoned: Vec<TaskId> = if drained_in_time {
            Vec::new()
        } else {
            state.in_flight.iter().copied().collect()
        };
        abandoned.sort();
        for task_id in &abandoned {
            tracing::warn!(
                task_id = %task_id,
                "run still in flight after drain timeout; left running"
            );
        }

        state.lifecycle = LoopState::Stopped;
        state.started_at = None;

        let report = DrainReport {
            drained: in_flight.saturating_sub(abandoned.len()),
            abandoned,
        };
        tracing::info!(
            drained = report.drained,
            abandoned = report.abandoned.len(),
            "scheduler stopped"
        );
        report
    }
}

async fn poll_loop(scheduler: Scheduler, mut shutdown_rx: watch::Receiver<bool>) {
    let every = scheduler.shared.config.poll_interval;
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let cycle_start = tokio::time::Instant::now();
        let report = scheduler.poll_once().await;
        if !report.dispatched.is_empty() {
            tracing::debug!(dispatched = report.dispatched.len(), "poll cycle dispatched tasks");
        }

        let pause = every.saturating_sub(cycle_start.elapsed());
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender gone: nobody can stop us any more, so stop now
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(pause) => {}
        }
    }
    tracing::debug!("poll loop exited");
}
