//! Test doubles for the ledger and the remote batch API
#![allow(dead_code)]

use arxiv_digest::ledger::{FailedJobs, LedgerStore, OngoingJobs, StoreError};
use arxiv_digest::models::job::CompletedRecord;
use arxiv_digest::services::batch_api::{ApiError, BatchApi, CreatedBatch, RemoteBatch};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// In-memory ledger. Can be told to fail `ongoing` writes to simulate a
/// crash after the terminal collections were persisted.
#[derive(Default)]
pub struct MemoryStore {
    ongoing: RefCell<OngoingJobs>,
    completed: RefCell<Vec<CompletedRecord>>,
    failed: RefCell<FailedJobs>,
    pub fail_ongoing_saves: Cell<bool>,
}

impl MemoryStore {
    /// Number of collections holding `batch_id`.
    pub fn collections_holding(&self, batch_id: &str) -> usize {
        let in_ongoing = self.ongoing.borrow().contains_key(batch_id);
        let in_completed = self.completed.borrow().iter().any(|r| r.batch_id == batch_id);
        let in_failed = self.failed.borrow().contains_key(batch_id);
        [in_ongoing, in_completed, in_failed].into_iter().filter(|held| *held).count()
    }
}

impl LedgerStore for MemoryStore {
    type Guard = ();

    fn lock(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn load_ongoing(&self) -> Result<OngoingJobs, StoreError> {
        Ok(self.ongoing.borrow().clone())
    }

    fn save_ongoing(&self, jobs: &OngoingJobs) -> Result<(), StoreError> {
        if self.fail_ongoing_saves.get() {
            return Err(StoreError::Io {
                path: PathBuf::from("ongoing.json"),
                source: std::io::Error::other("simulated crash"),
            });
        }
        *self.ongoing.borrow_mut() = jobs.clone();
        Ok(())
    }

    fn load_completed(&self) -> Result<Vec<CompletedRecord>, StoreError> {
        Ok(self.completed.borrow().clone())
    }

    fn save_completed(&self, records: &[CompletedRecord]) -> Result<(), StoreError> {
        *self.completed.borrow_mut() = records.to_vec();
        Ok(())
    }

    fn load_failed(&self) -> Result<FailedJobs, StoreError> {
        Ok(self.failed.borrow().clone())
    }

    fn save_failed(&self, jobs: &FailedJobs) -> Result<(), StoreError> {
        *self.failed.borrow_mut() = jobs.clone();
        Ok(())
    }
}

/// Scripted answer for one `poll` call.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Status(&'static str),
    Done { output_file_id: Option<&'static str> },
    Error(u16),
}

/// Batch API double. Each batch replays its script; the last step repeats.
#[derive(Default)]
pub struct FakeBatchApi {
    scripts: RefCell<HashMap<String, VecDeque<Step>>>,
    outputs: RefCell<HashMap<String, String>>,
    /// Contents of every uploaded request file, with its path.
    pub uploads: RefCell<Vec<(PathBuf, String)>>,
    pub poll_calls: RefCell<Vec<String>>,
    pub reject_submit: Cell<bool>,
}

impl FakeBatchApi {
    pub fn script(&self, batch_id: &str, steps: Vec<Step>) {
        self.scripts
            .borrow_mut()
            .insert(batch_id.to_string(), steps.into());
    }

    pub fn output(&self, file_id: &str, lines: &[String]) {
        self.outputs
            .borrow_mut()
            .insert(file_id.to_string(), lines.join("\n"));
    }

    pub fn polls_of(&self, batch_id: &str) -> usize {
        self.poll_calls.borrow().iter().filter(|id| *id == batch_id).count()
    }
}

impl BatchApi for FakeBatchApi {
    async fn submit(&self, requests_jsonl: &Path, _description: &str) -> Result<CreatedBatch, ApiError> {
        if self.reject_submit.get() {
            return Err(ApiError::Rejected {
                status: 400,
                body: "invalid file".to_string(),
            });
        }
        let contents = std::fs::read_to_string(requests_jsonl)?;
        let mut uploads = self.uploads.borrow_mut();
        uploads.push((requests_jsonl.to_path_buf(), contents));
        let n = uploads.len();
        Ok(CreatedBatch {
            batch_id: format!("batch_{n}"),
            input_file_id: format!("file-in-{n}"),
        })
    }

    async fn poll(&self, batch_id: &str) -> Result<RemoteBatch, ApiError> {
        self.poll_calls.borrow_mut().push(batch_id.to_string());

        let mut scripts = self.scripts.borrow_mut();
        let steps = scripts
            .get_mut(batch_id)
            .expect("poll for a batch without a script");
        let next = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().copied()
        };
        let step = next.expect("non-empty script");

        let remote = |status: &str, output_file_id: Option<&str>| RemoteBatch {
            id: batch_id.to_string(),
            status: status.to_string(),
            output_file_id: output_file_id.map(str::to_string),
            error_file_id: None,
        };
        match step {
            Step::Status(status) => Ok(remote(status, None)),
            Step::Done { output_file_id } => Ok(remote("completed", output_file_id)),
            Step::Error(status) => Err(ApiError::Rejected {
                status,
                body: "unavailable".to_string(),
            }),
        }
    }

    async fn fetch_output(&self, file_id: &str) -> Result<String, ApiError> {
        self.outputs
            .borrow()
            .get(file_id)
            .cloned()
            .ok_or(ApiError::Rejected {
                status: 404,
                body: format!("no file {file_id}"),
            })
    }
}
