//! Result store errors.

use thiserror::Error;
use vsat_core::{CoreError, TaskFailure, TaskState, TaskUuid};

/// Errors returned by the result store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for this identifier (never created, or already consumed).
    #[error("Invalid task: no result record for {0}")]
    InvalidTask(TaskUuid),

    /// The record has not reached a terminal state yet.
    #[error("Result for {task_uuid} not ready (state {state})")]
    NotReady { task_uuid: TaskUuid, state: TaskState },

    /// The record finished in the ERROR state; it has been consumed.
    #[error("Task {task_uuid} failed: {failure}")]
    TaskFailed {
        task_uuid: TaskUuid,
        failure: TaskFailure,
    },

    /// Domain rule violated (e.g. invalid state transition).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Filesystem error.
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record document could not be encoded or decoded.
    #[error("Record JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
