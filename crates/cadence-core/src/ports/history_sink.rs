//! HistorySink port - 実行履歴の外部記録
//!
//! スケジューラ自身の履歴はメモリ上（件数上限あり）で、再起動で消えます。
//! 永続化が必要な呼び出し側はこの trait を実装して builder に渡します。

use crate::app::history::ExecutionRecord;

/// Receives every finished run, successes and failures alike.
///
/// Called on the executing task after the scheduler's own state has been
/// updated, outside any scheduler lock. Implementations must not block.
pub trait HistorySink: Send + Sync {
    fn record(&self, entry: &ExecutionRecord);
}

/// Default sink: does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHistorySink;

impl HistorySink for NoopHistorySink {
    fn record(&self, _entry: &ExecutionRecord) {}
}
