//! Producer-side handle onto one result record.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use vsat_core::{ResultRecord, TaskState, TaskUuid};

use crate::{ResultStore, StoreError};

/// Handle returned by a dispatch.
///
/// Cheap to clone; every clone addresses the same record. The record is
/// consumed by the first successful result read through any handle.
#[derive(Clone)]
pub struct ResultHandle {
    task_uuid: TaskUuid,
    task_name: String,
    store: Arc<ResultStore>,
}

impl ResultHandle {
    /// Create a handle for `record` held in `store`.
    pub fn new(record: &ResultRecord, store: Arc<ResultStore>) -> Self {
        Self {
            task_uuid: record.task_uuid,
            task_name: record.task_name.clone(),
            store,
        }
    }

    /// Identifier of the record.
    pub fn task_uuid(&self) -> TaskUuid {
        self.task_uuid
    }

    /// Name of the dispatched task.
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Current state without consuming the record.
    pub async fn state(&self) -> Result<TaskState, StoreError> {
        self.store.get_state(&self.task_uuid).await
    }

    /// Full record without consuming it.
    pub async fn load(&self) -> Result<ResultRecord, StoreError> {
        self.store.load(&self.task_uuid).await
    }

    /// Report progress while the record is still with the producer.
    pub async fn set_progress(&self) -> Result<(), StoreError> {
        self.store
            .set_state(&self.task_uuid, TaskState::Progress)
            .await
    }

    /// Consume the result; see [`ResultStore::get_result`].
    pub async fn get_result(&self, block: bool) -> Result<Value, StoreError> {
        self.store.get_result(&self.task_uuid, block).await
    }

    /// Wait for and consume the result.
    pub async fn wait(&self) -> Result<Value, StoreError> {
        self.store.wait_result(&self.task_uuid).await
    }
}

impl fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("task_uuid", &self.task_uuid)
            .field("task_name", &self.task_name)
            .finish()
    }
}
