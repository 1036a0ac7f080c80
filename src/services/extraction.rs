//! Best-effort extraction of structured fields from model responses.
//!
//! The model is asked to answer in a fixed line format:
//!
//! ```text
//! keywords: <keyword1>, <keyword2>, ...
//! summary: <summary>
//! relevance to researcher 1: <1-5>, <explanation>
//! relevance to researcher 2: <1-5>, <explanation>
//! ```
//!
//! Nothing here fails. A line that does not match leaves its field empty.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::MAX_READERS;
use crate::models::outcome::{Personalization, RecordOutcome};

static KEYWORDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"keywords: (.*)").expect("valid keywords regex"));

static SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"summary: (.*)").expect("valid summary regex"));

/// One pattern per reader slot, `relevance to researcher 1` first.
static RELEVANCE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    (1..=MAX_READERS)
        .map(|slot| {
            Regex::new(&format!(r"relevance to researcher {slot}: ([1-5]), (.*)"))
                .expect("valid relevance regex")
        })
        .collect()
});

/// Extract keywords, summary and per-reader relevance from one response.
pub fn extract_outcome(paper_id: &str, content: &str) -> RecordOutcome {
    RecordOutcome {
        paper_id: paper_id.to_string(),
        keywords: extract_keywords(content),
        summary: capture_line(&SUMMARY_RE, content),
        personalizations: extract_personalizations(content),
        raw: Some(content.to_string()),
    }
}

fn extract_keywords(content: &str) -> Option<Vec<String>> {
    let line = capture_line(&KEYWORDS_RE, content)?;
    Some(
        line.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Slots are read in order and reading stops at the first gap.
fn extract_personalizations(content: &str) -> Vec<Personalization> {
    let mut personalizations = Vec::new();
    for re in RELEVANCE_RES.iter() {
        let Some(caps) = re.captures(content) else {
            break;
        };
        let Ok(relevance) = caps[1].parse::<u8>() else {
            break;
        };
        personalizations.push(Personalization {
            relevance,
            relevance_explanation: caps[2].trim_end().to_string(),
        });
    }
    personalizations
}

fn capture_line(re: &Regex, content: &str) -> Option<String> {
    re.captures(content)
        .map(|caps| caps[1].trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_response() {
        let content = "keywords: A, B\nsummary: S\nrelevance to researcher 1: 4, ok\nrelevance to researcher 2: 3, meh";
        let outcome = extract_outcome("2409.00001v1", content);

        assert_eq!(outcome.keywords, Some(vec!["A".to_string(), "B".to_string()]));
        assert_eq!(outcome.summary.as_deref(), Some("S"));
        assert_eq!(
            outcome.personalizations,
            vec![
                Personalization { relevance: 4, relevance_explanation: "ok".to_string() },
                Personalization { relevance: 3, relevance_explanation: "meh".to_string() },
            ]
        );
        assert_eq!(outcome.raw.as_deref(), Some(content));
    }

    #[test]
    fn test_missing_second_reader_keeps_first() {
        let content = "keywords: A\nsummary: S\nrelevance to researcher 1: 5, spot on";
        let outcome = extract_outcome("p", content);
        assert_eq!(outcome.personalizations.len(), 1);
        assert_eq!(outcome.relevance_for(0), Some(5));
        assert_eq!(outcome.relevance_for(1), None);
    }

    #[test]
    fn test_gap_is_never_filled_from_later_slot() {
        let content = "relevance to researcher 1: 2, meh\nrelevance to researcher 3: 5, great";
        let outcome = extract_outcome("p", content);
        assert_eq!(outcome.personalizations.len(), 1);
    }

    #[test]
    fn test_missing_first_reader_yields_none() {
        let content = "keywords: A\nrelevance to researcher 2: 5, great";
        assert!(extract_outcome("p", content).personalizations.is_empty());
    }

    #[test]
    fn test_out_of_range_score_stops_extraction() {
        let content = "relevance to researcher 1: 9, off the scale";
        assert!(extract_outcome("p", content).personalizations.is_empty());
    }

    #[test]
    fn test_unmatched_fields_are_absent() {
        let outcome = extract_outcome("p", "I cannot help with that.");
        assert_eq!(outcome.keywords, None);
        assert_eq!(outcome.summary, None);
        assert!(outcome.personalizations.is_empty());
    }

    #[test]
    fn test_crlf_and_empty_keywords_trimmed() {
        let content = "keywords: Graph Neural Networks, , Message Passing,\r\nsummary: Short.\r\n";
        let outcome = extract_outcome("p", content);
        assert_eq!(
            outcome.keywords,
            Some(vec!["Graph Neural Networks".to_string(), "Message Passing".to_string()])
        );
        assert_eq!(outcome.summary.as_deref(), Some("Short."));
    }

    #[test]
    fn test_all_reader_slots_read() {
        let content: String = (1..=MAX_READERS)
            .map(|i| format!("relevance to researcher {i}: 3, reason {i}\n"))
            .collect();
        let outcome = extract_outcome("p", &content);
        assert_eq!(outcome.personalizations.len(), MAX_READERS);
        assert_eq!(outcome.personalizations[7].relevance_explanation, "reason 8");
    }
}
