//! Registered tasks as seen by a producer.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use vsat_core::{TaskArgs, TaskDefinition, TaskError};
use vsat_store::ResultHandle;

use crate::{Context, PoolError};

/// A registered task bound to the context it dispatches through.
#[derive(Clone)]
pub struct Task {
    definition: Arc<TaskDefinition>,
    context: Arc<Context>,
}

impl Task {
    pub(crate) fn new(definition: Arc<TaskDefinition>, context: Arc<Context>) -> Self {
        Self {
            definition,
            context,
        }
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The shared definition held by the registry.
    pub fn definition(&self) -> &Arc<TaskDefinition> {
        &self.definition
    }

    /// Run the task now, on the calling thread.
    pub fn apply(&self, args: &TaskArgs) -> Result<Value, TaskError> {
        self.definition.call(args)
    }

    /// Queue the task on the context's current pool.
    pub async fn dispatch(&self, args: TaskArgs) -> Result<ResultHandle, PoolError> {
        self.context.dispatch(self.name(), args).await
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .finish()
    }
}
