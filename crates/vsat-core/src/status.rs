//! Status enums for task invocations and workers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

/// Lifecycle state of one task invocation.
///
/// States move forward along `CREATED -> [PROGRESS] -> RUNNING -> {FINISHED | ERROR}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Record written by the producer, not yet picked up.
    #[default]
    Created,
    /// Producer-reported progress before a worker takes over.
    Progress,
    /// A worker is executing the task body.
    Running,
    /// The body returned a value.
    Finished,
    /// The body failed; the result holds the failure payload.
    Error,
}

impl TaskState {
    /// Returns true if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Progress => 1,
            Self::Running => 2,
            Self::Finished | Self::Error => 3,
        }
    }

    /// Returns true if a record in this state may be moved to `next`.
    ///
    /// Terminal states never move. Otherwise a state may move forward, or be
    /// re-set to itself.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    /// Validates a transition from this state to `next`.
    pub fn validate_transition(&self, next: &Self) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidStateTransition {
                from: *self,
                to: *next,
            })
        }
    }

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Progress => "PROGRESS",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a worker in the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    /// Worker allocated but not started.
    #[default]
    Idle,
    /// Worker loop is consuming dispatch items.
    Running,
    /// Worker loop has exited.
    Stopped,
}

impl WorkerStatus {
    /// Returns true if the worker loop is running.
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Running)
    }
}
