use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

/// Chat-completions endpoint every request line in a batch targets.
pub const CHAT_COMPLETIONS_ENDPOINT: &str = "/v1/chat/completions";

/// A batch accepted by the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedBatch {
    pub batch_id: String,
    pub input_file_id: String,
}

/// Snapshot of a batch as reported by the remote service.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteBatch {
    pub id: String,
    /// Raw status string; see [`crate::models::job::BatchStatus`].
    pub status: String,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
}

/// The asynchronous batch API consumed by the submitter and the poller.
#[allow(async_fn_in_trait)]
pub trait BatchApi {
    /// Upload a JSONL request file and open a batch over it.
    async fn submit(&self, requests_jsonl: &Path, description: &str) -> Result<CreatedBatch, ApiError>;

    /// Current state of a batch.
    async fn poll(&self, batch_id: &str) -> Result<RemoteBatch, ApiError>;

    /// Raw text of an output file.
    async fn fetch_output(&self, file_id: &str) -> Result<String, ApiError>;
}

/// Client for an OpenAI-compatible batch API.
pub struct OpenAiBatchClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Deserialize)]
struct BatchObject {
    id: String,
    input_file_id: String,
}

impl OpenAiBatchClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn upload_batch_file(&self, path: &Path) -> Result<String, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("batch.jsonl")
            .to_string();

        let form = Form::new()
            .text("purpose", "batch")
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let file: FileObject = check(response).await?.json().await?;
        Ok(file.id)
    }

    async fn create_batch(
        &self,
        input_file_id: &str,
        description: &str,
    ) -> Result<CreatedBatch, ApiError> {
        let body = json!({
            "input_file_id": input_file_id,
            "endpoint": CHAT_COMPLETIONS_ENDPOINT,
            "completion_window": "24h",
            "metadata": { "description": description },
        });

        let response = self
            .http
            .post(format!("{}/batches", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let batch: BatchObject = check(response).await?.json().await?;
        Ok(CreatedBatch {
            batch_id: batch.id,
            input_file_id: batch.input_file_id,
        })
    }
}

impl BatchApi for OpenAiBatchClient {
    async fn submit(&self, requests_jsonl: &Path, description: &str) -> Result<CreatedBatch, ApiError> {
        let input_file_id = self.upload_batch_file(requests_jsonl).await?;
        tracing::debug!(input_file_id = %input_file_id, "Uploaded batch input file");
        self.create_batch(&input_file_id, description).await
    }

    async fn poll(&self, batch_id: &str) -> Result<RemoteBatch, ApiError> {
        let response = self
            .http
            .get(format!("{}/batches/{}", self.base_url, batch_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    async fn fetch_output(&self, file_id: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .get(format!("{}/files/{}/content", self.base_url, file_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Ok(check(response).await?.text().await?)
    }
}

/// Turn a non-2xx response into [`ApiError::Rejected`] with the body attached.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Batch API returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to read batch input file: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(e) => e.is_timeout() || e.is_connect(),
            ApiError::Rejected { status, .. } => *status == 429 || *status >= 500,
            ApiError::Io(_) => false,
        }
    }
}
