use chrono::Utc;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::config::{Reader, MAX_READERS};
use crate::models::paper::PaperRecord;
use crate::services::batch_api::{ApiError, BatchApi, CHAT_COMPLETIONS_ENDPOINT};

const SYSTEM_PROMPT: &str = "\
You will receive the title and abstract of a research paper in the field of Machine Learning (Computer Science) along with a description of several researchers' research interests. Your tasks are:

1. Identify the paper's precise subfield using up to 5 keywords (e.g., Reinforcement Learning from Human Feedback, Neural Architecture Search).
2. Summarize the paper in 2-3 concise and informative sentences.
3. Rate the relevance of the paper to each researcher's research interests on a scale of 1 to 5, with 5 being most relevant, and provide a brief justification.

Follow this exact format for your response:

    keywords: <keyword1>, <keyword2>, ...
    summary: <Your summary here.>
    relevance to researcher 1: <1-5>, <Your explanation here.>
    relevance to researcher 2: <1-5>, <Your explanation here.>
    ...

Do not add extra characters or spaces.";

/// A batch accepted by the remote service, ready to be tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedJob {
    pub batch_id: String,
    pub input_file_id: String,
    /// Paper ids in request order.
    pub entry_ids: Vec<String>,
}

#[derive(Serialize)]
struct BatchRequestLine<'a> {
    custom_id: &'a str,
    method: &'static str,
    url: &'static str,
    body: ChatRequest<'a>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Packages papers into one remote batch.
pub struct Submitter<'a, A> {
    api: &'a A,
    model: String,
    max_tokens: u32,
    staging_dir: PathBuf,
}

impl<'a, A: BatchApi> Submitter<'a, A> {
    pub fn new(api: &'a A, model: &str, max_tokens: u32, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            model: model.to_string(),
            max_tokens,
            staging_dir: staging_dir.into(),
        }
    }

    /// Submit one request per paper as a single batch.
    ///
    /// The request file is staged in a temporary file that is removed when
    /// this call returns, whether or not the submission succeeded.
    pub async fn submit(
        &self,
        papers: &[PaperRecord],
        readers: &[Reader],
    ) -> Result<SubmittedJob, SubmissionError> {
        if papers.is_empty() {
            return Err(SubmissionError::NothingToSubmit);
        }
        if readers.is_empty() || readers.len() > MAX_READERS {
            return Err(SubmissionError::ReaderCount(readers.len()));
        }

        std::fs::create_dir_all(&self.staging_dir)?;
        let mut staged = tempfile::Builder::new()
            .prefix("llm_summary_prompt")
            .suffix(".jsonl")
            .tempfile_in(&self.staging_dir)?;

        let interests = format_interests(readers);
        let mut entry_ids = Vec::with_capacity(papers.len());
        {
            let mut writer = BufWriter::new(staged.as_file_mut());
            for paper in papers {
                let line = BatchRequestLine {
                    custom_id: &paper.id,
                    method: "POST",
                    url: CHAT_COMPLETIONS_ENDPOINT,
                    body: ChatRequest {
                        model: &self.model,
                        messages: [
                            ChatMessage {
                                role: "system",
                                content: SYSTEM_PROMPT.to_string(),
                            },
                            ChatMessage {
                                role: "user",
                                content: user_prompt(paper, &interests),
                            },
                        ],
                        max_tokens: self.max_tokens,
                    },
                };
                serde_json::to_writer(&mut writer, &line)?;
                writer.write_all(b"\n")?;
                entry_ids.push(paper.id.clone());
            }
            writer.flush()?;
        }

        let description = format!("arxiv_abstract {}", Utc::now().format("%Y%m%d%H%M%S"));
        let created = self
            .api
            .submit(staged.path(), &description)
            .await
            .map_err(SubmissionError::Rejected)?;

        tracing::info!(
            batch_id = %created.batch_id,
            input_file_id = %created.input_file_id,
            requests = entry_ids.len(),
            "Batch submitted"
        );
        metrics::counter!("batch_jobs_submitted_total").increment(1);

        Ok(SubmittedJob {
            batch_id: created.batch_id,
            input_file_id: created.input_file_id,
            entry_ids,
        })
    }
}

fn format_interests(readers: &[Reader]) -> String {
    readers
        .iter()
        .enumerate()
        .map(|(i, reader)| format!("Researcher {}: {}", i + 1, reader.interests))
        .collect::<Vec<_>>()
        .join("\n")
}

fn user_prompt(paper: &PaperRecord, interests: &str) -> String {
    format!(
        "Here's the title and abstract of a research paper:\nTitle: {}\n\nAbstract: {}\n\nUser's research interests:\n{}\n",
        paper.title, paper.abstract_text, interests
    )
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("No papers to submit")]
    NothingToSubmit,

    #[error("Between 1 and {max} readers are supported, got {0}", max = MAX_READERS)]
    ReaderCount(usize),

    #[error("Failed to stage batch input: {0}")]
    Stage(#[from] std::io::Error),

    #[error("Failed to serialize batch request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Batch submission rejected: {0}")]
    Rejected(ApiError),
}
