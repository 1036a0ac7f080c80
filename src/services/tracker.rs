//! Batch lifecycle tracking.
//!
//! A batch is born `ongoing` when its submission succeeds and dies by moving
//! to exactly one of `completed` or `failed`. Terminal collections are always
//! persisted before `ongoing`, so an interrupted cycle can leave a batch in
//! two collections but never in none. The next cycle reconciles such
//! duplicates before polling.

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::config::Reader;
use crate::ledger::{LedgerStore, OngoingJobs, StoreError};
use crate::models::job::{CompletedRecord, FailedRecord, JobRecord};
use crate::models::paper::PaperRecord;
use crate::services::batch_api::BatchApi;
use crate::services::poller::{JobPoller, PollOutcome};
use crate::services::submitter::{SubmissionError, SubmittedJob, Submitter};

/// Counts reported by one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    /// Batches that moved to `completed` in this cycle
    pub completed: usize,
    /// Batches left `ongoing`, including those whose poll errored
    pub in_progress: usize,
    /// Batches that moved to `failed` in this cycle
    pub failed: usize,
    /// Polls that hit a retrieval error; already counted in `in_progress`
    pub retrieval_errors: usize,
    /// Stale `ongoing` entries dropped because a terminal record existed
    pub reconciled: usize,
}

/// One poll-all cycle over the ledger.
#[allow(async_fn_in_trait)]
pub trait PollCycle {
    async fn poll_all(&self) -> Result<PollSummary, TrackerError>;
}

/// Owns the transitions between the three ledger collections.
pub struct LifecycleTracker<'a, S, P> {
    store: &'a S,
    poller: &'a P,
}

impl<'a, S: LedgerStore, P: JobPoller> LifecycleTracker<'a, S, P> {
    pub fn new(store: &'a S, poller: &'a P) -> Self {
        Self { store, poller }
    }

    /// Record a freshly submitted batch as ongoing.
    pub fn record_submission(
        &self,
        job: SubmittedJob,
        list_date: NaiveDate,
    ) -> Result<JobRecord, TrackerError> {
        let _guard = self.store.lock()?;
        let mut ongoing = self.store.load_ongoing()?;

        let record = track(&mut ongoing, job, list_date);
        self.store.save_ongoing(&ongoing)?;

        metrics::gauge!("batch_jobs_ongoing").set(ongoing.len() as f64);
        Ok(record)
    }

    /// Submit `papers` as one batch and record it as ongoing.
    ///
    /// The ledger is locked and loaded before the remote call and stays
    /// locked until the new batch is saved. A busy or uninitialised ledger
    /// fails here without creating a remote batch.
    pub async fn submit_and_record<A: BatchApi>(
        &self,
        submitter: &Submitter<'_, A>,
        papers: &[PaperRecord],
        readers: &[Reader],
        list_date: NaiveDate,
    ) -> Result<JobRecord, TrackerError> {
        let _guard = self.store.lock()?;
        let mut ongoing = self.store.load_ongoing()?;

        let job = submitter.submit(papers, readers).await?;
        let record = track(&mut ongoing, job, list_date);
        if let Err(e) = self.store.save_ongoing(&ongoing) {
            tracing::error!(
                batch_id = %record.batch_id,
                input_file_id = %record.input_file_id,
                error = %e,
                "Remote batch created but could not be recorded"
            );
            return Err(e.into());
        }

        metrics::gauge!("batch_jobs_ongoing").set(ongoing.len() as f64);
        Ok(record)
    }
}

fn track(ongoing: &mut OngoingJobs, job: SubmittedJob, list_date: NaiveDate) -> JobRecord {
    let record = JobRecord {
        batch_id: job.batch_id,
        input_file_id: job.input_file_id,
        list_date,
        submitted_at: Utc::now(),
        entry_ids: job.entry_ids,
    };
    if ongoing
        .insert(record.batch_id.clone(), record.clone())
        .is_some()
    {
        tracing::warn!(batch_id = %record.batch_id, "Batch id already tracked, replacing");
    }
    tracing::info!(
        batch_id = %record.batch_id,
        list_date = %record.list_date,
        entries = record.entry_ids.len(),
        "Tracking new batch"
    );
    record
}

impl<S: LedgerStore, P: JobPoller> PollCycle for LifecycleTracker<'_, S, P> {
    async fn poll_all(&self) -> Result<PollSummary, TrackerError> {
        let _guard = self.store.lock()?;
        let mut ongoing = self.store.load_ongoing()?;
        let mut completed = self.store.load_completed()?;
        let mut failed = self.store.load_failed()?;

        let mut summary = PollSummary::default();

        // Leftovers from a cycle interrupted after its terminal write.
        let before = ongoing.len();
        ongoing.retain(|batch_id, _| {
            let terminal = failed.contains_key(batch_id)
                || completed.iter().any(|record| &record.batch_id == batch_id);
            if terminal {
                tracing::warn!(batch_id = %batch_id, "Batch already has a terminal record, dropping from ongoing");
            }
            !terminal
        });
        summary.reconciled = before - ongoing.len();

        let mut finished = Vec::new();
        for (batch_id, job) in &ongoing {
            match self.poller.poll(job).await {
                Ok(PollOutcome::Completed(response)) => {
                    tracing::info!(
                        batch_id = %batch_id,
                        outcomes = response.len(),
                        "Batch completed"
                    );
                    completed.insert(0, CompletedRecord::new(job.clone(), response));
                    finished.push(batch_id.clone());
                    summary.completed += 1;
                }
                Ok(PollOutcome::Terminated(status)) => {
                    tracing::warn!(batch_id = %batch_id, status = %status, "Batch ended without output");
                    failed.insert(batch_id.clone(), FailedRecord::new(job.clone(), status));
                    finished.push(batch_id.clone());
                    summary.failed += 1;
                }
                Ok(PollOutcome::Pending(status)) => {
                    tracing::info!(batch_id = %batch_id, status = %status, "Batch still in progress");
                    summary.in_progress += 1;
                }
                Err(e) => {
                    tracing::error!(
                        batch_id = %batch_id,
                        error = %e,
                        transient = e.is_transient(),
                        "Failed to poll batch, will retry next cycle"
                    );
                    summary.in_progress += 1;
                    summary.retrieval_errors += 1;
                }
            }
        }

        if summary.completed > 0 {
            self.store.save_completed(&completed)?;
        }
        if summary.failed > 0 {
            self.store.save_failed(&failed)?;
        }
        if !finished.is_empty() || summary.reconciled > 0 {
            for batch_id in &finished {
                ongoing.shift_remove(batch_id);
            }
            self.store.save_ongoing(&ongoing)?;
        }

        metrics::counter!("batch_jobs_completed_total").increment(summary.completed as u64);
        metrics::counter!("batch_jobs_failed_total").increment(summary.failed as u64);
        metrics::counter!("batch_poll_errors_total").increment(summary.retrieval_errors as u64);
        metrics::gauge!("batch_jobs_ongoing").set(ongoing.len() as f64);

        tracing::info!(
            completed = summary.completed,
            in_progress = summary.in_progress,
            failed = summary.failed,
            retrieval_errors = summary.retrieval_errors,
            reconciled = summary.reconciled,
            "Poll cycle finished"
        );

        Ok(summary)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Ledger error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),
}
