use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::outcome::RecordOutcome;

/// Status of a remote batch job as reported by the batch API.
///
/// The remote reports `validating` and `finalizing` as well; those fold into
/// `Queued` and `InProgress` respectively.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchStatus {
    #[strum(to_string = "queued", serialize = "validating")]
    Queued,
    #[strum(to_string = "in_progress", serialize = "finalizing")]
    InProgress,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
}

impl BatchStatus {
    /// Statuses that end a job's life without usable output.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            BatchStatus::Failed | BatchStatus::Expired | BatchStatus::Cancelling | BatchStatus::Cancelled
        )
    }

    pub fn is_pending(self) -> bool {
        matches!(self, BatchStatus::Queued | BatchStatus::InProgress)
    }
}

/// A submitted batch that has not reached a terminal state yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub batch_id: String,
    pub input_file_id: String,
    /// Listing date the submitted abstracts were published on.
    pub list_date: NaiveDate,
    pub submitted_at: DateTime<Utc>,
    /// Paper ids in the order they were written to the batch input file.
    pub entry_ids: Vec<String>,
}

/// A batch whose output was retrieved and parsed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedRecord {
    pub batch_id: String,
    pub list_date: NaiveDate,
    pub submit_info: JobRecord,
    pub response: Vec<RecordOutcome>,
    pub retrieved_at: DateTime<Utc>,
}

impl CompletedRecord {
    pub fn new(job: JobRecord, response: Vec<RecordOutcome>) -> Self {
        Self {
            batch_id: job.batch_id.clone(),
            list_date: job.list_date,
            submit_info: job,
            response,
            retrieved_at: Utc::now(),
        }
    }
}

/// A batch the remote service gave up on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedRecord {
    pub batch_id: String,
    pub submit_info: JobRecord,
    pub status: BatchStatus,
    pub retrieved_at: DateTime<Utc>,
}

impl FailedRecord {
    pub fn new(job: JobRecord, status: BatchStatus) -> Self {
        Self {
            batch_id: job.batch_id.clone(),
            submit_info: job,
            status,
            retrieved_at: Utc::now(),
        }
    }
}
