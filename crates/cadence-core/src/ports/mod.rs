//! Ports - 抽象化レイヤー
//!
//! スケジューラが外部に依存する境界（時刻、ID、実行単位、履歴の記録先）を
//! trait として定義します。

pub mod action;
pub mod clock;
pub mod history_sink;
pub mod id_generator;

pub use self::action::{ActionContext, CancelSignal, FnAction, TaskAction, action_fn};
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::history_sink::{HistorySink, NoopHistorySink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
