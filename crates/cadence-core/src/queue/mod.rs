//! Queue module: task records, registry, due-time queue and retry policy.
//!
//! Everything here is plain synchronous state. The scheduler serializes
//! access behind one lock and never holds it across an action's await.

mod due;
mod record;
mod registry;
mod retry;

pub use due::DueQueue;
pub use record::TaskRecord;
pub use registry::{Removal, TaskRegistry};
pub use retry::RetryPolicy;
