//! Execution of one dispatched record.
//!
//! Loads the record, marks it RUNNING, resolves the task in the local
//! registry and runs the body on tokio's blocking pool. The outcome is
//! written back to the store: FINISHED with the return value, or ERROR with
//! a [`TaskFailure`] payload when the body fails, panics, or the task name is
//! unknown to this process.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinError;
use tracing::{debug, info, warn};

use vsat_core::{TaskError, TaskFailure, TaskRegistry, TaskState, TaskUuid, WorkerId};
use vsat_store::ResultStore;

use crate::PoolError;

/// How a dispatched record ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Body returned a value; record is FINISHED.
    Finished,
    /// Record is ERROR with this failure.
    Failed(TaskFailure),
}

/// Runs dispatched records against a registry and a store.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<TaskRegistry>,
    store: Arc<ResultStore>,
}

impl Executor {
    /// Create a new executor.
    pub fn new(registry: Arc<TaskRegistry>, store: Arc<ResultStore>) -> Self {
        Self { registry, store }
    }

    /// Execute the record `task_uuid` on behalf of `worker_id`.
    ///
    /// A failing body is not an error here: it is persisted and reported as
    /// [`ExecutionOutcome::Failed`]. Errors are store failures (missing or
    /// unreadable record, I/O), after which the record may be left RUNNING.
    pub async fn execute(
        &self,
        worker_id: &WorkerId,
        task_uuid: TaskUuid,
    ) -> Result<ExecutionOutcome, PoolError> {
        let record = self.store.load(&task_uuid).await?;
        self.store.set_state(&task_uuid, TaskState::Running).await?;

        let definition = match self.registry.resolve(&record.task_name) {
            Ok(definition) => definition,
            Err(e) => {
                warn!(
                    worker_id = %worker_id,
                    task_uuid = %task_uuid,
                    task = %record.task_name,
                    "Task is not registered in this process"
                );
                return self.fail(&task_uuid, TaskFailure::from(&e)).await;
            }
        };

        debug!(worker_id = %worker_id, task_uuid = %task_uuid, task = %record.task_name, "Executing task");

        let args = record.task_args();
        let started = Instant::now();
        let joined = tokio::task::spawn_blocking(move || definition.call(&args)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match joined {
            Ok(Ok(value)) => {
                self.store.set_result(&task_uuid, value).await?;
                debug!(
                    worker_id = %worker_id,
                    task_uuid = %task_uuid,
                    duration_ms,
                    "Task finished"
                );
                Ok(ExecutionOutcome::Finished)
            }
            Ok(Err(err)) => {
                info!(
                    worker_id = %worker_id,
                    task_uuid = %task_uuid,
                    duration_ms,
                    error = %err,
                    "Task failed"
                );
                self.fail(&task_uuid, TaskFailure::from(&err)).await
            }
            Err(join_err) => {
                let err = TaskError::Panicked(panic_message(join_err));
                warn!(
                    worker_id = %worker_id,
                    task_uuid = %task_uuid,
                    error = %err,
                    "Task panicked"
                );
                self.fail(&task_uuid, TaskFailure::from(&err)).await
            }
        }
    }

    async fn fail(
        &self,
        task_uuid: &TaskUuid,
        failure: TaskFailure,
    ) -> Result<ExecutionOutcome, PoolError> {
        self.store.set_error(task_uuid, failure.to_payload()).await?;
        Ok(ExecutionOutcome::Failed(failure))
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }

    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use vsat_core::{TaskArgs, TaskDefinition};
    use vsat_store::{StoreConfig, StoreError};

    async fn setup(dir: &TempDir) -> (Arc<TaskRegistry>, Arc<ResultStore>, Executor) {
        let registry = TaskRegistry::new();
        let store = ResultStore::open(StoreConfig::new(dir.path())).await.unwrap();
        let executor = Executor::new(registry.clone(), store.clone());
        (registry, store, executor)
    }

    #[tokio::test]
    async fn test_execute_finishes_record() {
        let dir = TempDir::new().unwrap();
        let (registry, store, executor) = setup(&dir).await;
        registry.register(TaskDefinition::from_fn("add", |args: &TaskArgs| {
            Ok::<_, TaskError>(args.arg::<i64>(0)? + args.arg::<i64>(1)?)
        }));

        let record = store.create("add", TaskArgs::positional([2, 5])).await.unwrap();
        let outcome = executor
            .execute(&WorkerId::new("w"), record.task_uuid)
            .await
            .unwrap();

        assert_eq!(outcome, ExecutionOutcome::Finished);
        assert_eq!(store.try_result(&record.task_uuid).await.unwrap(), json!(7));
    }

    #[tokio::test]
    async fn test_unknown_task_is_persisted_as_error() {
        let dir = TempDir::new().unwrap();
        let (_registry, store, executor) = setup(&dir).await;

        let record = store.create("missing", TaskArgs::new()).await.unwrap();
        let outcome = executor
            .execute(&WorkerId::new("w"), record.task_uuid)
            .await
            .unwrap();

        let ExecutionOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, "unknown_task");
        assert_eq!(store.get_state(&record.task_uuid).await.unwrap(), TaskState::Error);
    }

    #[tokio::test]
    async fn test_panic_is_persisted_as_error() {
        let dir = TempDir::new().unwrap();
        let (registry, store, executor) = setup(&dir).await;
        registry.register(TaskDefinition::from_fn("explode", |_: &TaskArgs| -> Result<i64, TaskError> {
            panic!("kaboom")
        }));

        let record = store.create("explode", TaskArgs::new()).await.unwrap();
        executor
            .execute(&WorkerId::new("w"), record.task_uuid)
            .await
            .unwrap();

        match store.try_result(&record.task_uuid).await {
            Err(StoreError::TaskFailed { failure, .. }) => {
                assert_eq!(failure.kind, "panicked");
                assert!(failure.message.contains("kaboom"));
            }
            other => panic!("expected TaskFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (_registry, _store, executor) = setup(&dir).await;

        let err = executor
            .execute(&WorkerId::new("w"), TaskUuid::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Store(StoreError::InvalidTask(_))));
    }
}
