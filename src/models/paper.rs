use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One abstract from the arXiv listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperRecord {
    /// Short arXiv id, e.g. `2409.08123v1`.
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub link: String,
    /// Category terms, e.g. `cs.LG`.
    pub tags: Vec<String>,
    pub published: DateTime<Utc>,
}
