//! VSAT Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - The async runtime
//! - The filesystem
//! - Worker scheduling
//!
//! Everything that crosses the producer/worker boundary is defined here:
//! task identifiers, the persisted result record, dispatch items, and the
//! registry that maps task names to callables.

pub mod error;
pub mod ids;
pub mod record;
pub mod registry;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{TaskUuid, WorkerId};
pub use record::{DispatchItem, ResultRecord, TaskFailure};
pub use registry::TaskRegistry;
pub use status::{TaskState, WorkerStatus};
pub use task::{TaskArgs, TaskBody, TaskDefinition, TaskError, TaskOptions};
