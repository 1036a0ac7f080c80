use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

use crate::models::job::{BatchStatus, JobRecord};
use crate::models::outcome::RecordOutcome;
use crate::services::batch_api::{ApiError, BatchApi};
use crate::services::extraction::extract_outcome;

/// What a single poll learned about a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Still `queued` or `in_progress`.
    Pending(BatchStatus),
    /// Finished; one outcome per submitted paper, in submission order.
    Completed(Vec<RecordOutcome>),
    /// `failed`, `expired`, `cancelling` or `cancelled`.
    Terminated(BatchStatus),
}

/// Checks one batch against the remote service.
#[allow(async_fn_in_trait)]
pub trait JobPoller {
    async fn poll(&self, job: &JobRecord) -> Result<PollOutcome, RetrievalError>;
}

/// [`JobPoller`] backed by a [`BatchApi`].
pub struct BatchPoller<'a, A> {
    api: &'a A,
}

impl<'a, A: BatchApi> BatchPoller<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }
}

impl<A: BatchApi> JobPoller for BatchPoller<'_, A> {
    async fn poll(&self, job: &JobRecord) -> Result<PollOutcome, RetrievalError> {
        let remote = self.api.poll(&job.batch_id).await?;

        let status = BatchStatus::from_str(&remote.status).unwrap_or_else(|_| {
            tracing::warn!(
                batch_id = %job.batch_id,
                status = %remote.status,
                "Unrecognised batch status, treating as in progress"
            );
            BatchStatus::InProgress
        });

        if status.is_pending() {
            return Ok(PollOutcome::Pending(status));
        }
        if status.is_failure() {
            return Ok(PollOutcome::Terminated(status));
        }

        let raw = match remote.output_file_id.as_deref() {
            Some(file_id) => self.api.fetch_output(file_id).await?,
            None => {
                tracing::warn!(
                    batch_id = %job.batch_id,
                    error_file_id = ?remote.error_file_id,
                    "Completed batch has no output file"
                );
                String::new()
            }
        };

        let parsed = parse_batch_output(&raw);
        Ok(PollOutcome::Completed(align_outcomes(
            &job.batch_id,
            &job.entry_ids,
            parsed,
        )))
    }
}

#[derive(Deserialize)]
struct OutputLine {
    custom_id: String,
    #[serde(default)]
    response: Option<OutputResponse>,
}

#[derive(Deserialize)]
struct OutputResponse {
    status_code: u16,
    #[serde(default)]
    body: Option<ChatCompletion>,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Parse a batch output file (one JSON object per line) into outcomes keyed
/// by paper id.
///
/// Lines that are not valid JSON are skipped. Lines for failed requests yield
/// an all-absent outcome.
pub fn parse_batch_output(raw: &str) -> HashMap<String, RecordOutcome> {
    let mut outcomes = HashMap::new();

    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: OutputLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "Skipping malformed batch output line");
                continue;
            }
        };

        let content = parsed
            .response
            .filter(|r| r.status_code == 200)
            .and_then(|r| r.body)
            .and_then(|body| body.choices.into_iter().next())
            .and_then(|choice| choice.message.content);

        let outcome = match content {
            Some(content) => extract_outcome(&parsed.custom_id, &content),
            None => {
                tracing::warn!(paper_id = %parsed.custom_id, "Request in batch returned no content");
                RecordOutcome::absent(&parsed.custom_id)
            }
        };
        outcomes.insert(parsed.custom_id, outcome);
    }

    outcomes
}

/// Order outcomes by the ids recorded at submission.
///
/// Ids the remote left out get an all-absent outcome; ids that were never
/// submitted are dropped.
pub fn align_outcomes(
    batch_id: &str,
    entry_ids: &[String],
    mut parsed: HashMap<String, RecordOutcome>,
) -> Vec<RecordOutcome> {
    let aligned: Vec<RecordOutcome> = entry_ids
        .iter()
        .map(|id| {
            parsed.remove(id).unwrap_or_else(|| {
                tracing::warn!(batch_id = %batch_id, paper_id = %id, "Batch output is missing a submitted paper");
                RecordOutcome::absent(id)
            })
        })
        .collect();

    if !parsed.is_empty() {
        tracing::warn!(
            batch_id = %batch_id,
            unexpected = parsed.len(),
            "Dropping batch output for papers that were not submitted"
        );
    }

    aligned
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Failed to retrieve batch: {0}")]
    Api(#[from] ApiError),
}

impl RetrievalError {
    pub fn is_transient(&self) -> bool {
        match self {
            RetrievalError::Api(e) => e.is_transient(),
        }
    }
}
