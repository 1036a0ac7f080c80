use crate::config::{ConfigError, Settings};
use crate::ledger::JsonFileStore;
use crate::services::{
    arxiv::{ArxivClient, ArxivError},
    batch_api::{ApiError, OpenAiBatchClient},
};

/// Everything a command needs, built once per process.
pub struct AppState {
    pub settings: Settings,
    pub store: JsonFileStore,
    pub batch_api: OpenAiBatchClient,
    pub arxiv: ArxivClient,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, StateError> {
        let timeout = settings.app.http_timeout();
        let api_key = settings.api_key()?.to_string();

        let batch_api = OpenAiBatchClient::new(&settings.app.openai_base_url, &api_key, timeout)?;
        let arxiv = ArxivClient::new(&settings.app.arxiv_base_url, timeout)?;
        let store = JsonFileStore::new(settings.digest.ledger_dir());

        Ok(Self {
            settings,
            store,
            batch_api,
            arxiv,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build batch API client: {0}")]
    BatchApi(#[from] ApiError),

    #[error("Failed to build arXiv client: {0}")]
    Arxiv(#[from] ArxivError),
}
