//! Outcome model: what a single run produced.
//!
//! The scheduler never interprets a result. Actions hand back an opaque
//! [`Payload`] which is stored and reported verbatim.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque result blob produced by a task action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(String);

impl Payload {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Serialize any value as JSON text.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ActionError> {
        serde_json::to_string(value)
            .map(Self)
            .map_err(|e| ActionError::new(format!("json encode: {e}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First `max_chars` characters, for history/reporting.
    pub fn preview(&self, max_chars: usize) -> String {
        match self.0.char_indices().nth(max_chars) {
            Some((idx, _)) => self.0[..idx].to_string(),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Error returned by a task action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Why a run failed. Every variant counts against the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The action returned an error.
    #[error("{0}")]
    Action(String),

    /// The per-run timeout elapsed; the run was aborted.
    #[error("timed out after {0:?}")]
    TimedOut(#[serde(with = "crate::app::config::duration_ms")] Duration),

    /// The action panicked.
    #[error("action panicked: {0}")]
    Panicked(String),
}

impl From<ActionError> for FailureReason {
    fn from(err: ActionError) -> Self {
        FailureReason::Action(err.message)
    }
}

/// Outcome of one run as observed by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded(Payload),
    Failed(FailureReason),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded(_))
    }
}
