//! SchedulerBuilder - 構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンで ports を差し替え可能にする（テストでは ManualClock）
//! - 起動時検証（Fail-fast 設計）: 不正な設定は build() で弾く

use std::sync::Arc;

use super::config::SchedulerConfig;
use super::scheduler::Scheduler;
use crate::domain::{Decider, RetryDecider};
use crate::ports::{Clock, HistorySink, IdGenerator, NoopHistorySink, SystemClock, UlidGenerator};

/// SchedulerBuilder は Scheduler を構築
///
/// # 使用例
/// ```ignore
/// let scheduler = SchedulerBuilder::new()
///     .config(SchedulerConfig::default())
///     .clock(Arc::new(ManualClock::new(start)))
///     .build()?;
/// ```
///
/// 指定しなかった port は既定値:
/// - clock: SystemClock
/// - id_generator: 同じ clock を使う UlidGenerator
/// - decider: config.retry を使う RetryDecider
/// - history_sink: NoopHistorySink
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
    history_sink: Option<Arc<dyn HistorySink>>,
}

/// BuildError は構築時の設定エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("poll_interval must be greater than zero")]
    ZeroPollInterval,

    #[error("max_concurrency must be at least 1 (omit it for unbounded)")]
    ZeroConcurrency,

    #[error("retry base_delay ({base_ms}ms) exceeds max_delay ({max_ms}ms)")]
    RetryDelayInverted { base_ms: u128, max_ms: u128 },

    #[error("history limits must be at least 1 (successes={successes}, failures={failures})")]
    EmptyHistory { successes: usize, failures: usize },
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Replace the retry/reschedule rules.
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn history_sink(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history_sink = Some(sink);
        self
    }

    /// # 検証
    /// - poll_interval > 0
    /// - max_concurrency は None か 1 以上
    /// - retry.base_delay <= retry.max_delay
    /// - history の各上限 >= 1
    pub fn build(self) -> Result<Scheduler, BuildError> {
        validate(&self.config)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let id_generator = self
            .id_generator
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(RetryDecider::new(self.config.retry.clone())));
        let sink = self
            .history_sink
            .unwrap_or_else(|| Arc::new(NoopHistorySink));

        Ok(Scheduler::assemble(
            self.config,
            clock,
            id_generator,
            decider,
            sink,
        ))
    }
}

fn validate(config: &SchedulerConfig) -> Result<(), BuildError> {
    if config.poll_interval.is_zero() {
        return Err(BuildError::ZeroPollInterval);
    }
    if config.max_concurrency == Some(0) {
        return Err(BuildError::ZeroConcurrency);
    }
    if config.retry.base_delay > config.retry.max_delay {
        return Err(BuildError::RetryDelayInverted {
            base_ms: config.retry.base_delay.as_millis(),
            max_ms: config.retry.max_delay.as_millis(),
        });
    }
    if config.history.successes == 0 || config.history.failures == 0 {
        return Err(BuildError::EmptyHistory {
            successes: config.history.successes,
            failures: config.history.failures,
        });
    }
    Ok(())
}
