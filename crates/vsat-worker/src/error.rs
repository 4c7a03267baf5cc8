//! Worker pool errors.

use thiserror::Error;
use vsat_core::CoreError;
use vsat_store::StoreError;

/// Errors from the pool, dispatch and task lookup.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The context has no pool yet.
    #[error("Worker pool has not been initialised")]
    PoolNotInitialised,

    /// `start` was called on a pool whose workers are already spawned.
    #[error("Worker pool already started")]
    AlreadyStarted,

    /// A pool without workers would never run what it is given.
    #[error("Worker pool has no workers")]
    NoWorkers,

    /// The dispatch channel has no receiver.
    #[error("Dispatch channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
