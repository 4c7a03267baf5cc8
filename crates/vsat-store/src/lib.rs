//! VSAT Result Store
//!
//! Persists the lifecycle of each task invocation as one JSON document under
//! a root directory, so producers and workers can observe each other's
//! progress without sharing memory. Any process pointed at the same root sees
//! the same records.
//!
//! Writes are published atomically (temporary file + rename) and a record is
//! consumed exactly once: reading a terminal result deletes it.

pub mod config;
pub mod error;
pub mod handle;
pub mod store;

pub use config::StoreConfig;
pub use error::StoreError;
pub use handle::ResultHandle;
pub use store::ResultStore;
