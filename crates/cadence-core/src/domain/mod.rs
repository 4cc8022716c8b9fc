//! Domain model (IDs, task specs, status, outcomes, decisions, errors).

pub mod decision;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;

pub use decision::{Decider, Decision, RetryDecider, add_duration};
pub use errors::SchedulerError;
pub use ids::{RunId, TaskId};
pub use outcome::{ActionError, FailureReason, Payload, RunOutcome};
pub use state::{LoopState, TaskStatus};
pub use task::{DEFAULT_MAX_RETRIES, Priority, ScheduleKind, TaskSpec};
