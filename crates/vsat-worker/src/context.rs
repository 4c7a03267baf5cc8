//! Application context: the registry, the store and the current pool.
//!
//! Built once by the entry point and passed around as `Arc<Context>`.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use vsat_core::{TaskArgs, TaskDefinition, TaskRegistry};
use vsat_store::{ResultHandle, ResultStore};

use crate::{Config, PoolError, Task, WorkerPool};

/// Registry, result store and the active worker pool of one process.
pub struct Context {
    registry: Arc<TaskRegistry>,
    store: Arc<ResultStore>,
    pool: RwLock<Option<Arc<WorkerPool>>>,
}

impl Context {
    /// Create a context over an existing registry and store.
    pub fn new(registry: Arc<TaskRegistry>, store: Arc<ResultStore>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            store,
            pool: RwLock::new(None),
        })
    }

    /// Open the configured store and start with an empty registry.
    pub async fn from_config(config: &Config) -> Result<Arc<Self>, PoolError> {
        let store = ResultStore::open(config.store.clone()).await?;
        Ok(Self::new(TaskRegistry::new(), store))
    }

    /// The task registry.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// The result store.
    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Register a definition and return it as a dispatchable [`Task`].
    pub fn register(self: &Arc<Self>, definition: TaskDefinition) -> Task {
        let definition = self.registry.register(definition);
        Task::new(definition, self.clone())
    }

    /// Look up a registered task by name.
    pub fn task(self: &Arc<Self>, name: &str) -> Result<Task, PoolError> {
        let definition = self.registry.resolve(name)?;
        Ok(Task::new(definition, self.clone()))
    }

    /// Build a pool of `num_workers` workers and make it the current pool.
    ///
    /// A previous pool is replaced without being stopped; whoever still holds
    /// it is responsible for stopping it.
    pub fn init_pool(&self, num_workers: usize) -> Arc<WorkerPool> {
        let pool = Arc::new(WorkerPool::new(
            num_workers,
            self.registry.clone(),
            self.store.clone(),
        ));

        if self.pool.write().replace(pool.clone()).is_some() {
            warn!("Replaced the current worker pool; the previous pool was not stopped");
        }
        info!(workers = num_workers, "Initialised worker pool");
        pool
    }

    /// The current pool.
    pub fn current_pool(&self) -> Result<Arc<WorkerPool>, PoolError> {
        self.pool.read().clone().ok_or(PoolError::PoolNotInitialised)
    }

    /// Create a record for `task_name` and queue it on the current pool.
    ///
    /// Returns as soon as the record is written; workers need not be running.
    pub async fn dispatch(&self, task_name: &str, args: TaskArgs) -> Result<ResultHandle, PoolError> {
        self.registry.resolve(task_name)?;
        let pool = self.current_pool()?;

        let record = self.store.create(task_name, args).await?;
        pool.schedule(&record)?;

        Ok(ResultHandle::new(&record, self.store.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vsat_core::{CoreError, TaskError, TaskState};
    use vsat_store::StoreConfig;

    async fn context(dir: &TempDir) -> Arc<Context> {
        let config = Config {
            store: StoreConfig::new(dir.path()),
            ..Config::default()
        };
        Context::from_config(&config).await.unwrap()
    }

    fn noop() -> TaskDefinition {
        TaskDefinition::from_fn("noop", |_: &TaskArgs| Ok::<_, TaskError>(()))
    }

    #[tokio::test]
    async fn test_current_pool_before_init() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        assert!(matches!(ctx.current_pool(), Err(PoolError::PoolNotInitialised)));
    }

    #[tokio::test]
    async fn test_init_pool_replaces_current() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        let first = ctx.init_pool(1);
        let second = ctx.init_pool(3);

        let current = ctx.current_pool().unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert!(!Arc::ptr_eq(&current, &first));
        assert_eq!(current.worker_count(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_requires_pool() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let task = ctx.register(noop());

        let err = task.dispatch(TaskArgs::new()).await.unwrap_err();
        assert!(matches!(err, PoolError::PoolNotInitialised));
        assert!(ctx.store().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_without_running_workers_returns_immediately() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let task = ctx.register(noop());
        ctx.init_pool(2);

        let handle = task.dispatch(TaskArgs::new()).await.unwrap();
        assert_eq!(handle.task_name(), "noop");
        assert_eq!(handle.state().await.unwrap(), TaskState::Created);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_name() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        ctx.init_pool(1);

        let err = ctx.dispatch("nope", TaskArgs::new()).await.unwrap_err();
        assert!(matches!(err, PoolError::Core(CoreError::UnknownTask(_))));
        assert!(matches!(ctx.task("nope"), Err(PoolError::Core(CoreError::UnknownTask(_)))));
    }
}
