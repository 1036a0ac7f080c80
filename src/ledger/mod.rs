//! Persistence for the batch lifecycle ledger.
//!
//! The ledger is three collections: batches still running on the remote
//! (`ongoing`), batches whose output was retrieved (`completed`, newest
//! first) and batches the remote gave up on (`failed`). Each is loaded and
//! rewritten whole.

use indexmap::IndexMap;
use std::path::PathBuf;

use crate::models::job::{CompletedRecord, FailedRecord, JobRecord};

pub mod file_store;

pub use file_store::JsonFileStore;

/// Running batches keyed by batch id, in submission order.
pub type OngoingJobs = IndexMap<String, JobRecord>;

/// Failed batches keyed by batch id.
pub type FailedJobs = IndexMap<String, FailedRecord>;

/// Storage behind the lifecycle tracker.
///
/// Callers hold the guard returned by [`LedgerStore::lock`] for the whole
/// load-modify-write cycle.
pub trait LedgerStore {
    type Guard;

    fn lock(&self) -> Result<Self::Guard, StoreError>;

    fn load_ongoing(&self) -> Result<OngoingJobs, StoreError>;
    fn save_ongoing(&self, jobs: &OngoingJobs) -> Result<(), StoreError>;

    fn load_completed(&self) -> Result<Vec<CompletedRecord>, StoreError>;
    fn save_completed(&self, records: &[CompletedRecord]) -> Result<(), StoreError>;

    fn load_failed(&self) -> Result<FailedJobs, StoreError>;
    fn save_failed(&self, jobs: &FailedJobs) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Ledger file {0} does not exist (run `init` to create an empty ledger)")]
    Missing(PathBuf),

    #[error("Ledger file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Ledger at {0} is locked by another process")]
    Locked(PathBuf),

    #[error("Ledger I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}
