//! Core domain errors.

use thiserror::Error;

use crate::TaskState;

/// Core domain errors for VSAT.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No task is registered under this name.
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: TaskState, to: TaskState },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
