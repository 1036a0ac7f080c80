use chrono::NaiveDate;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::Reader;
use crate::models::job::CompletedRecord;
use crate::models::outcome::RecordOutcome;
use crate::models::paper::PaperRecord;

/// Newest completed batch for a listing date.
pub fn latest_for_date(completed: &[CompletedRecord], date: NaiveDate) -> Option<&CompletedRecord> {
    completed.iter().find(|record| record.list_date == date)
}

/// Outcomes ordered by descending relevance for one reader slot.
///
/// The sort is stable, so equal scores keep their batch order. Outcomes
/// without a score for this slot go last.
pub fn rank_for_reader(outcomes: &[RecordOutcome], slot: usize) -> Vec<&RecordOutcome> {
    let mut ranked: Vec<&RecordOutcome> = outcomes.iter().collect();
    ranked.sort_by_key(|outcome| Reverse(outcome.relevance_for(slot).unwrap_or(0)));
    ranked
}

/// Render one reader's digest as Markdown.
pub fn render_reader_digest(
    outcomes: &[RecordOutcome],
    papers: &HashMap<&str, &PaperRecord>,
    slot: usize,
) -> String {
    let mut out = String::new();

    for outcome in rank_for_reader(outcomes, slot) {
        let Some(paper) = papers.get(outcome.paper_id.as_str()) else {
            tracing::warn!(paper_id = %outcome.paper_id, "No abstract cached for paper, skipping");
            continue;
        };

        let keywords = outcome
            .keywords
            .as_ref()
            .map(|k| k.join(", "))
            .unwrap_or_default();
        let relevance = match outcome.personalizations.get(slot) {
            Some(p) => format!("{}\n\n  {}", p.relevance, p.relevance_explanation),
            None => "n/a\n".to_string(),
        };

        out.push_str(&format!(
            "# [{}]({})\n- Authors: {}\n- Keywords: {keywords}\n- Relevance: {relevance}\n- Summary\n\n  {}\n",
            paper.title,
            paper.link,
            paper.authors.join(", "),
            outcome.summary.as_deref().unwrap_or(""),
        ));
    }

    out
}

/// Write `<out_dir>/<reader id>/<date>.md` for every reader.
pub fn write_digests(
    record: &CompletedRecord,
    papers: &[PaperRecord],
    readers: &[Reader],
    out_dir: &Path,
) -> Result<Vec<PathBuf>, DigestError> {
    let by_id: HashMap<&str, &PaperRecord> = papers.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut written = Vec::with_capacity(readers.len());
    for (slot, reader) in readers.iter().enumerate() {
        let reader_dir = out_dir.join(&reader.id);
        std::fs::create_dir_all(&reader_dir).map_err(|source| DigestError::Io {
            path: reader_dir.clone(),
            source,
        })?;

        let path = reader_dir.join(format!("{}.md", record.list_date));
        let body = render_reader_digest(&record.response, &by_id, slot);
        std::fs::write(&path, body).map_err(|source| DigestError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!(reader = %reader.id, path = %path.display(), "Wrote digest");
        written.push(path);
    }

    Ok(written)
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("No completed batch for {0}")]
    NoResults(NaiveDate),

    #[error("Failed to write digest {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
