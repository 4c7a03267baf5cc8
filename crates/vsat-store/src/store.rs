//! File-backed result store.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};
use uuid::Uuid;

use vsat_core::{CoreError, ResultRecord, TaskArgs, TaskFailure, TaskState, TaskUuid};

use crate::{StoreConfig, StoreError};

const RECORD_EXTENSION: &str = "json";

/// Durable store of [`ResultRecord`]s, one JSON file per record.
///
/// There is no locking between writers: `set_*` is a whole-record
/// read-modify-write, and two actors updating the same record concurrently
/// lose one of the updates. Callers keep to a single writer per record
/// (producer creates, one worker runs and finishes).
pub struct ResultStore {
    root: PathBuf,
    poll_interval: Duration,

    /// Wake-ups for blocking readers, keyed by record.
    waiters: Mutex<HashMap<TaskUuid, Arc<Notify>>>,
}

impl ResultStore {
    /// Open (creating if needed) the store directory.
    pub async fn open(config: StoreConfig) -> Result<Arc<Self>, StoreError> {
        tokio::fs::create_dir_all(&config.root).await?;
        debug!(root = %config.root.display(), "Opened result store");

        Ok(Arc::new(Self {
            root: config.root,
            poll_interval: config.poll_interval,
            waiters: Mutex::new(HashMap::new()),
        }))
    }

    /// Directory holding the records.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the record for `task_uuid`.
    pub fn path_for(&self, task_uuid: &TaskUuid) -> PathBuf {
        self.root.join(format!("{}.{}", task_uuid, RECORD_EXTENSION))
    }

    /// Create and persist a new CREATED record.
    pub async fn create(
        &self,
        task_name: &str,
        args: TaskArgs,
    ) -> Result<ResultRecord, StoreError> {
        let record = ResultRecord::new(task_name, args);
        self.write(&record).await?;

        debug!(task_uuid = %record.task_uuid, task = %record.task_name, "Created result record");
        Ok(record)
    }

    /// Load a record.
    pub async fn load(&self, task_uuid: &TaskUuid) -> Result<ResultRecord, StoreError> {
        read_record(&self.path_for(task_uuid))
            .await?
            .ok_or(StoreError::InvalidTask(*task_uuid))
    }

    /// Current state of a record. Does not consume it.
    pub async fn get_state(&self, task_uuid: &TaskUuid) -> Result<TaskState, StoreError> {
        Ok(self.load(task_uuid).await?.state)
    }

    /// Move a record to `state`.
    pub async fn set_state(&self, task_uuid: &TaskUuid, state: TaskState) -> Result<(), StoreError> {
        self.update(task_uuid, |record| record.transition(state))
            .await
            .map(|_| ())
    }

    /// Store a return value and mark the record FINISHED.
    pub async fn set_result(&self, task_uuid: &TaskUuid, value: Value) -> Result<(), StoreError> {
        self.update(task_uuid, |record| record.finish(value))
            .await
            .map(|_| ())
    }

    /// Store a failure payload and mark the record ERROR.
    pub async fn set_error(&self, task_uuid: &TaskUuid, payload: Value) -> Result<(), StoreError> {
        self.update(task_uuid, |record| record.fail(payload))
            .await
            .map(|_| ())
    }

    /// Retrieve and consume the result, waiting for it when `block` is set.
    ///
    /// See [`try_result`](Self::try_result) and [`wait_result`](Self::wait_result).
    pub async fn get_result(&self, task_uuid: &TaskUuid, block: bool) -> Result<Value, StoreError> {
        if block {
            self.wait_result(task_uuid).await
        } else {
            self.try_result(task_uuid).await
        }
    }

    /// Retrieve and consume the result without waiting.
    ///
    /// Fails with [`StoreError::NotReady`] unless the record is FINISHED or
    /// ERROR. A FINISHED record yields its value; an ERROR record yields
    /// [`StoreError::TaskFailed`]. Either way the record is deleted and later
    /// lookups fail with [`StoreError::InvalidTask`].
    pub async fn try_result(&self, task_uuid: &TaskUuid) -> Result<Value, StoreError> {
        let record = self.load(task_uuid).await?;
        if !record.is_terminal() {
            return Err(StoreError::NotReady {
                task_uuid: *task_uuid,
                state: record.state,
            });
        }

        let record = self.consume(task_uuid).await?;
        match record.state {
            TaskState::Error => Err(StoreError::TaskFailed {
                task_uuid: *task_uuid,
                failure: TaskFailure::from_payload(&record.result),
            }),
            _ => Ok(record.result),
        }
    }

    /// Wait until the record is terminal, then consume it like
    /// [`try_result`](Self::try_result).
    ///
    /// Writes through this store wake the waiter immediately. Writes from
    /// other processes are picked up on the poll interval. There is no
    /// timeout. Dropping the future (e.g. under `tokio::time::timeout`)
    /// releases the wake-up registration for the record.
    pub async fn wait_result(&self, task_uuid: &TaskUuid) -> Result<Value, StoreError> {
        let waiter = self.waiter(task_uuid);

        loop {
            let notified = waiter.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_result(task_uuid).await {
                Err(StoreError::NotReady { state, .. }) => {
                    trace!(task_uuid = %task_uuid, state = %state, "Result not ready, waiting");
                }
                other => return other,
            }

            let _ = tokio::time::timeout(self.poll_interval, notified).await;
        }
    }

    /// Identifiers of every record currently in the store.
    pub async fn list(&self) -> Result<Vec<TaskUuid>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(id) = TaskUuid::parse(stem) {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn update<F>(&self, task_uuid: &TaskUuid, apply: F) -> Result<ResultRecord, StoreError>
    where
        F: FnOnce(&mut ResultRecord) -> Result<(), CoreError>,
    {
        let mut record = self.load(task_uuid).await?;
        apply(&mut record)?;
        self.write(&record).await?;
        self.notify(task_uuid);

        trace!(task_uuid = %task_uuid, state = %record.state, "Updated result record");
        Ok(record)
    }

    /// Publish a record: write a private temporary file, then rename it over
    /// the record path so readers only ever see whole documents.
    async fn write(&self, record: &ResultRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.task_uuid);
        let tmp = self.scratch_path(&record.task_uuid, "tmp");
        let bytes = serde_json::to_vec_pretty(record)?;

        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Take exclusive ownership of a record by renaming it away, then delete it.
    ///
    /// Only one of several concurrent consumers can win the rename.
    async fn consume(&self, task_uuid: &TaskUuid) -> Result<ResultRecord, StoreError> {
        let claim = self.scratch_path(task_uuid, "claim");
        match tokio::fs::rename(self.path_for(task_uuid), &claim).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::InvalidTask(*task_uuid))
            }
            Err(e) => return Err(e.into()),
        }

        let record = read_record(&claim).await;
        tokio::fs::remove_file(&claim).await?;
        self.forget(task_uuid);

        debug!(task_uuid = %task_uuid, "Consumed result record");
        record?.ok_or(StoreError::InvalidTask(*task_uuid))
    }

    fn scratch_path(&self, task_uuid: &TaskUuid, kind: &str) -> PathBuf {
        let name = format!(".{}.{}.{}", task_uuid, Uuid::new_v4().simple(), kind);
        self.root.join(name)
    }

    fn waiter(&self, task_uuid: &TaskUuid) -> Waiter<'_> {
        let notify = self
            .waiters
            .lock()
            .entry(*task_uuid)
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone();

        Waiter {
            store: self,
            task_uuid: *task_uuid,
            notify,
        }
    }

    fn notify(&self, task_uuid: &TaskUuid) {
        if let Some(notify) = self.waiters.lock().get(task_uuid) {
            notify.notify_waiters();
        }
    }

    fn forget(&self, task_uuid: &TaskUuid) {
        self.waiters.lock().remove(task_uuid);
    }
}

/// One blocking reader's registration in the waiter map.
///
/// The map entry is shared by every reader of the same record and removed by
/// the last one to leave.
struct Waiter<'a> {
    store: &'a ResultStore,
    task_uuid: TaskUuid,
    notify: Arc<Notify>,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut waiters = self.store.waiters.lock();
        let Some(current) = waiters.get(&self.task_uuid) else {
            return;
        };
        // Held by the map and by this reader only.
        if Arc::ptr_eq(current, &self.notify) && Arc::strong_count(&self.notify) == 2 {
            waiters.remove(&self.task_uuid);
        }
    }
}

async fn read_record(path: &Path) -> Result<Option<ResultRecord>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
