//! App - アプリケーション層
//!
//! queue と ports を組み合わせて scheduler を実装します。
//!
//! # 主要コンポーネント
//! - **SchedulerBuilder**: 構築とワイヤリング（fail-fast な設定検証）
//! - **Scheduler**: 公開 API とポーリングループ
//! - **executor**: 1 回分の実行（timeout / panic 捕捉 / 結果の反映）
//! - **ExecutionHistory**: 直近の実行履歴
//! - **status**: クエリ用のビュー

pub mod builder;
pub mod config;
mod executor;
pub mod history;
pub mod scheduler;
pub mod status;

pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::config::{HistoryLimits, SchedulerConfig, StoppedPolicy};
pub use self::history::{ExecutionHistory, ExecutionRecord, ExecutionResult};
pub use self::scheduler::Scheduler;
pub use self::status::{
    CycleReport, DrainReport, Metrics, SchedulerStatus, TaskStatistics, TaskStatusView,
};
