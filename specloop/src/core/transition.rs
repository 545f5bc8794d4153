//! Task status transition table.
//!
//! The table is closed: `not_started → queued → in_progress → completed`,
//! plus `in_progress → not_started` (correction reset). Anything else is a
//! caller-side logic bug and surfaces as a typed error.

use std::error::Error;
use std::fmt;

use crate::tasks::TaskStatus;

/// True for the four permitted transitions.
pub fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
    matches!(
        (from, to),
        (TaskStatus::NotStarted, TaskStatus::Queued)
            | (TaskStatus::Queued, TaskStatus::InProgress)
            | (TaskStatus::InProgress, TaskStatus::Completed)
            | (TaskStatus::InProgress, TaskStatus::NotStarted)
    )
}

/// Rejected status transition. Downcastable from `anyhow::Error` so callers
/// can distinguish table violations from environment failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionError {
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid transition for task '{}': {} -> {}",
            self.task_id,
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl Error for TransitionError {}

/// Validate a proposed transition against the table.
pub fn validate_transition(
    task_id: &str,
    from: TaskStatus,
    to: TaskStatus,
) -> Result<(), TransitionError> {
    if is_valid_transition(from, to) {
        return Ok(());
    }
    Err(TransitionError {
        task_id: task_id.to_string(),
        from,
        to,
    })
}
