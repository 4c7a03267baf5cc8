//! VSAT Worker Pool
//!
//! This crate ties the registry and the result store together:
//! - [`Context`] owns the registry, the store and the current pool
//! - [`Task`] runs a registered definition locally or dispatches it
//! - [`WorkerPool`] feeds dispatch items from one shared channel to a fixed
//!   set of workers, which execute them and write the outcome to the store

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod pool;
pub mod task;

pub use config::Config;
pub use context::Context;
pub use error::PoolError;
pub use executor::{ExecutionOutcome, Executor};
pub use pool::{StopSummary, WorkerInfo, WorkerPool};
pub use task::Task;

// Re-export the layers below so applications need a single dependency.
pub use vsat_core::{
    register_task, task_name, CoreError, ResultRecord, TaskArgs, TaskDefinition, TaskError,
    TaskFailure, TaskOptions, TaskRegistry, TaskState, TaskUuid, WorkerId, WorkerStatus,
};
pub use vsat_store::{ResultHandle, ResultStore, StoreConfig, StoreError};
