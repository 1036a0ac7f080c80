use std::path::{Path, PathBuf};
use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

/// Most reader profiles a single request can score against.
pub const MAX_READERS: usize = 8;

/// Process-level settings read from the environment (and `.env`).
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Batch API key. Takes precedence over `api_key` in the config file.
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible batch API
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Base URL of the arXiv query API
    #[serde(default = "default_arxiv_base_url")]
    pub arxiv_base_url: String,

    /// Timeout applied to every outbound HTTP request, in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_arxiv_base_url() -> String {
    "http://export.arxiv.org/api".to_string()
}

fn default_http_timeout_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// A reader whose interests every paper is scored against.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Reader {
    /// Used as the digest directory name.
    #[garde(length(min = 1, max = 64))]
    pub id: String,

    #[garde(length(min = 1))]
    pub interests: String,
}

/// Contents of the JSON config file passed on the command line.
#[derive(Debug, Deserialize, Validate)]
pub struct DigestConfig {
    #[serde(default)]
    #[garde(skip)]
    pub api_key: Option<String>,

    // Upper bound mirrors MAX_READERS.
    #[garde(length(min = 1, max = 8), dive)]
    pub users: Vec<Reader>,

    /// arXiv category to list
    #[serde(default = "default_category")]
    #[garde(length(min = 1))]
    pub category: String,

    /// Root for the abstract cache, the batch ledger and rendered digests
    #[serde(default = "default_data_dir")]
    #[garde(skip)]
    pub data_dir: PathBuf,

    #[serde(default = "default_model")]
    #[garde(length(min = 1))]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    #[garde(range(min = 1))]
    pub max_tokens: u32,
}

fn default_category() -> String {
    "cs.LG".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

impl DigestConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: DigestConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn abstracts_dir(&self) -> PathBuf {
        self.data_dir.join("arxiv_abstracts")
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.data_dir.join("batch_query_manage")
    }

    pub fn markdown_dir(&self) -> PathBuf {
        self.data_dir.join("markdown")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("tmp")
    }
}

/// Environment and config file combined.
#[derive(Debug)]
pub struct Settings {
    pub app: AppConfig,
    pub digest: DigestConfig,
}

impl Settings {
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let app = AppConfig::from_env()?;
        let digest = DigestConfig::from_file(config_path)?;
        Ok(Self { app, digest })
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.app
            .openai_api_key
            .as_deref()
            .or(self.digest.api_key.as_deref())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(#[from] garde::Report),

    #[error("Environment configuration error: {0}")]
    Env(#[from] envy::Error),

    #[error("No API key: set OPENAI_API_KEY or api_key in the config file")]
    MissingApiKey,
}
