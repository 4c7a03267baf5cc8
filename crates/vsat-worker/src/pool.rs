//! Worker pool - a fixed set of workers fed from one dispatch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use vsat_core::{DispatchItem, ResultRecord, TaskRegistry, WorkerId, WorkerStatus};
use vsat_store::ResultStore;

use crate::executor::{ExecutionOutcome, Executor};
use crate::PoolError;

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<DispatchItem>>>;

/// Snapshot of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
}

/// Result of [`WorkerPool::stop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopSummary {
    /// Workers that exited within the timeout.
    pub exited: usize,
    /// Workers still running when the timeout elapsed. They are not aborted.
    pub timed_out: usize,
}

struct Worker {
    id: WorkerId,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn status(&self) -> WorkerStatus {
        match &self.handle {
            None => WorkerStatus::Idle,
            Some(handle) if handle.is_finished() => WorkerStatus::Stopped,
            Some(_) => WorkerStatus::Running,
        }
    }
}

/// A fixed set of workers sharing one FIFO dispatch channel.
///
/// Any number of producers may [`schedule`](Self::schedule) concurrently;
/// each item is taken by exactly one worker, but which one is unspecified.
/// Workers are not supervised: a worker that dies mid-task leaves its record
/// RUNNING.
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<DispatchItem>,
    rx: SharedReceiver,
    workers: Mutex<Vec<Worker>>,
    num_workers: usize,
    executor: Executor,
}

impl WorkerPool {
    /// Allocate the channel and `num_workers` workers. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(num_workers: usize, registry: Arc<TaskRegistry>, store: Arc<ResultStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let workers = (0..num_workers)
            .map(|_| Worker {
                id: WorkerId::generate(),
                handle: None,
            })
            .collect();

        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            workers: Mutex::new(workers),
            num_workers,
            executor: Executor::new(registry, store),
        }
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.num_workers
    }

    /// Spawn every worker on the current tokio runtime.
    pub async fn start(&self) -> Result<(), PoolError> {
        let mut workers = self.workers.lock().await;
        if workers.is_empty() {
            return Err(PoolError::NoWorkers);
        }
        if workers.iter().any(|w| w.handle.is_some()) {
            return Err(PoolError::AlreadyStarted);
        }

        info!(workers = workers.len(), "Starting worker pool");

        for worker in workers.iter_mut() {
            let id = worker.id.clone();
            let rx = self.rx.clone();
            let executor = self.executor.clone();
            worker.handle = Some(tokio::spawn(async move {
                worker_loop(id, rx, executor).await;
            }));
        }

        Ok(())
    }

    /// Queue `record` for execution.
    pub fn schedule(&self, record: &ResultRecord) -> Result<(), PoolError> {
        self.tx
            .send(DispatchItem::run(record))
            .map_err(|_| PoolError::ChannelClosed)?;

        debug!(task_uuid = %record.task_uuid, task = %record.task_name, "Scheduled task");
        Ok(())
    }

    /// Send one stop sentinel per running worker, then wait up to `timeout`
    /// for each of them to exit.
    ///
    /// Items queued before the sentinels are still executed. Workers that
    /// outlive the timeout keep running.
    pub async fn stop(&self, timeout: Duration) -> Result<StopSummary, PoolError> {
        let mut workers = self.workers.lock().await;
        let running = workers
            .iter()
            .filter(|w| w.status() == WorkerStatus::Running)
            .count();

        info!(workers = running, "Shutting down workers");
        for _ in 0..running {
            self.tx
                .send(DispatchItem::Stop)
                .map_err(|_| PoolError::ChannelClosed)?;
        }

        let mut summary = StopSummary::default();
        for worker in workers.iter_mut() {
            let Some(handle) = worker.handle.as_mut() else {
                continue;
            };
            if handle.is_finished() {
                summary.exited += 1;
                continue;
            }

            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => summary.exited += 1,
                Ok(Err(e)) => {
                    error!(worker_id = %worker.id, error = %e, "Worker terminated abnormally");
                    summary.exited += 1;
                }
                Err(_) => {
                    warn!(worker_id = %worker.id, timeout_ms = timeout.as_millis() as u64, "Worker did not stop in time");
                    summary.timed_out += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Current status of every worker.
    pub async fn workers(&self) -> Vec<WorkerInfo> {
        self.workers
            .lock()
            .await
            .iter()
            .map(|w| WorkerInfo {
                worker_id: w.id.clone(),
                status: w.status(),
            })
            .collect()
    }

    /// Number of workers whose loop is running.
    pub async fn alive_count(&self) -> usize {
        self.workers
            .lock()
            .await
            .iter()
            .filter(|w| w.status().is_alive())
            .count()
    }
}

async fn worker_loop(worker_id: WorkerId, rx: SharedReceiver, executor: Executor) {
    info!(worker_id = %worker_id, "Worker started");

    loop {
        // Only one worker waits on the receiver at a time; the lock is
        // released as soon as an item is taken.
        let item = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        match item {
            Some(DispatchItem::Run { task_uuid }) => {
                match executor.execute(&worker_id, task_uuid).await {
                    Ok(ExecutionOutcome::Finished) => {}
                    Ok(ExecutionOutcome::Failed(failure)) => {
                        debug!(worker_id = %worker_id, task_uuid = %task_uuid, failure = %failure, "Recorded task failure");
                    }
                    Err(e) => {
                        error!(worker_id = %worker_id, task_uuid = %task_uuid, error = %e, "Failed to process dispatch item");
                    }
                }
            }
            Some(DispatchItem::Stop) => {
                debug!(worker_id = %worker_id, "Received stop sentinel");
                break;
            }
            None => {
                warn!(worker_id = %worker_id, "Dispatch channel closed");
                break;
            }
        }
    }

    info!(worker_id = %worker_id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use vsat_core::{TaskArgs, TaskDefinition, TaskError, TaskState};
    use vsat_store::StoreConfig;

    async fn pool_with(dir: &TempDir, num_workers: usize) -> (Arc<TaskRegistry>, Arc<ResultStore>, WorkerPool) {
        let registry = TaskRegistry::new();
        let store = ResultStore::open(StoreConfig::new(dir.path())).await.unwrap();
        let pool = WorkerPool::new(num_workers, registry.clone(), store.clone());
        (registry, store, pool)
    }

    async fn check_lifecycle(num_workers: usize) {
        let dir = TempDir::new().unwrap();
        let (_registry, _store, pool) = pool_with(&dir, num_workers).await;

        assert_eq!(pool.worker_count(), num_workers);
        assert_eq!(pool.workers().await.len(), num_workers);
        assert_eq!(pool.alive_count().await, 0);

        pool.start().await.unwrap();
        assert_eq!(pool.alive_count().await, num_workers);

        let summary = pool.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(summary, StopSummary { exited: num_workers, timed_out: 0 });
        assert_eq!(pool.alive_count().await, 0);
        assert!(pool
            .workers()
            .await
            .iter()
            .all(|w| w.status == WorkerStatus::Stopped));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pool_lifecycle_single_worker() {
        check_lifecycle(1).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_lifecycle_twenty_workers() {
        check_lifecycle(20).await;
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let dir = TempDir::new().unwrap();
        let (_registry, _store, pool) = pool_with(&dir, 2).await;

        pool.start().await.unwrap();
        assert!(matches!(pool.start().await, Err(PoolError::AlreadyStarted)));
        pool.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_without_workers_fails() {
        let dir = TempDir::new().unwrap();
        let (_registry, _store, pool) = pool_with(&dir, 0).await;

        assert!(matches!(pool.start().await, Err(PoolError::NoWorkers)));
        assert_eq!(pool.alive_count().await, 0);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let (_registry, _store, pool) = pool_with(&dir, 3).await;

        let summary = pool.stop(Duration::from_millis(10)).await.unwrap();
        assert_eq!(summary, StopSummary::default());
        assert!(pool.workers().await.iter().all(|w| w.status == WorkerStatus::Idle));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_leaves_busy_worker_running() {
        let dir = TempDir::new().unwrap();
        let (registry, store, pool) = pool_with(&dir, 1).await;
        registry.register(TaskDefinition::from_fn("slow", |_: &TaskArgs| {
            std::thread::sleep(Duration::from_millis(500));
            Ok::<_, TaskError>("done")
        }));

        pool.start().await.unwrap();
        let record = store.create("slow", TaskArgs::new()).await.unwrap();
        pool.schedule(&record).unwrap();

        // Let the worker pick the item up before asking it to stop.
        while store.get_state(&record.task_uuid).await.unwrap() != TaskState::Running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let summary = pool.stop(Duration::from_millis(20)).await.unwrap();
        assert_eq!(summary, StopSummary { exited: 0, timed_out: 1 });
        assert_eq!(pool.alive_count().await, 1);

        // The straggler still finishes its item and then honours the sentinel.
        assert_eq!(store.wait_result(&record.task_uuid).await.unwrap(), json!("done"));
        let summary = pool.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(summary.exited, 1);
        assert_eq!(pool.alive_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_items_run_in_fifo_order_on_one_worker() {
        let dir = TempDir::new().unwrap();
        let (registry, store, pool) = pool_with(&dir, 1).await;
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();
        registry.register(TaskDefinition::from_fn("record", move |args: &TaskArgs| {
            let n: i64 = args.arg(0)?;
            log.lock().push(n);
            Ok::<_, TaskError>(n)
        }));

        let mut ids = Vec::new();
        for n in 0..20 {
            let record = store.create("record", TaskArgs::positional([n])).await.unwrap();
            pool.schedule(&record).unwrap();
            ids.push(record.task_uuid);
        }
        pool.start().await.unwrap();

        for id in &ids {
            store.wait_result(id).await.unwrap();
        }
        assert_eq!(*seen.lock(), (0..20).collect::<Vec<i64>>());
        pool.stop(Duration::from_secs(5)).await.unwrap();
    }
}
