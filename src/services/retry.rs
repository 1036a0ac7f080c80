use std::time::Duration;
use tokio::time::sleep;

use crate::services::tracker::{PollCycle, PollSummary, TrackerError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Fixed-interval retry budget for draining ongoing batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// How a drive ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveReport {
    pub attempts: u32,
    /// Summary of the final cycle, if any ran.
    pub last: Option<PollSummary>,
    /// True when no batch was left in progress.
    pub drained: bool,
}

/// Run `poll_all` until nothing is in progress or the budget runs out.
///
/// Running out of attempts is not an error; remaining batches stay ongoing
/// for the next invocation. Ledger errors abort immediately.
pub async fn drive<T: PollCycle>(tracker: &T, policy: RetryPolicy) -> Result<DriveReport, TrackerError> {
    let mut report = DriveReport {
        attempts: 0,
        last: None,
        drained: false,
    };

    while report.attempts < policy.max_attempts {
        report.attempts += 1;
        let summary = tracker.poll_all().await?;
        report.last = Some(summary);

        if summary.in_progress == 0 {
            report.drained = true;
            tracing::info!(attempts = report.attempts, "All batches resolved");
            return Ok(report);
        }

        if report.attempts < policy.max_attempts {
            tracing::debug!(
                attempt = report.attempts,
                in_progress = summary.in_progress,
                interval_secs = policy.interval.as_secs(),
                "Batches still in progress, sleeping"
            );
            sleep(policy.interval).await;
        }
    }

    tracing::warn!(
        attempts = report.attempts,
        in_progress = report.last.map(|s| s.in_progress).unwrap_or_default(),
        "Retry budget exhausted, leaving batches ongoing"
    );
    Ok(report)
}
