use serde::{Deserialize, Serialize};

/// Relevance of one paper to one reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Personalization {
    /// 1 (unrelated) to 5 (squarely on topic).
    pub relevance: u8,
    pub relevance_explanation: String,
}

/// Structured fields extracted from one paper's model response.
///
/// Every field is best-effort: `None` means the pattern was not found, and
/// `personalizations` holds a contiguous prefix of reader slots starting at
/// reader 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordOutcome {
    pub paper_id: String,
    pub keywords: Option<Vec<String>>,
    pub summary: Option<String>,
    #[serde(default)]
    pub personalizations: Vec<Personalization>,
    /// Message content as returned by the model; `None` when the batch output
    /// had no line for this paper.
    pub raw: Option<String>,
}

impl RecordOutcome {
    /// Outcome for a paper the remote output left out entirely.
    pub fn absent(paper_id: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            keywords: None,
            summary: None,
            personalizations: Vec::new(),
            raw: None,
        }
    }

    /// Relevance score for the zero-based reader slot, if the model gave one.
    pub fn relevance_for(&self, slot: usize) -> Option<u8> {
        self.personalizations.get(slot).map(|p| p.relevance)
    }
}
