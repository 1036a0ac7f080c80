//! Canned papers, readers and batch output lines

use arxiv_digest::config::Reader;
use arxiv_digest::models::paper::PaperRecord;
use chrono::{NaiveDate, TimeZone, Utc};

pub fn list_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 12).unwrap()
}

pub fn paper(id: &str) -> PaperRecord {
    PaperRecord {
        id: id.to_string(),
        title: format!("Paper {id}"),
        abstract_text: format!("Abstract of {id}."),
        authors: vec!["Ada Lovelace".to_string()],
        link: format!("http://arxiv.org/abs/{id}"),
        tags: vec!["cs.LG".to_string()],
        published: Utc.with_ymd_and_hms(2024, 9, 12, 12, 0, 0).unwrap(),
    }
}

pub fn papers(ids: &[&str]) -> Vec<PaperRecord> {
    ids.iter().map(|id| paper(id)).collect()
}

pub fn readers(n: usize) -> Vec<Reader> {
    (1..=n)
        .map(|i| Reader {
            id: format!("reader{i}"),
            interests: format!("topic {i}"),
        })
        .collect()
}

/// Model answer in the requested line format, one score per reader.
pub fn answer(summary: &str, scores: &[u8]) -> String {
    let mut text = format!("keywords: Bandits, Exploration\nsummary: {summary}\n");
    for (i, score) in scores.iter().enumerate() {
        text.push_str(&format!("relevance to researcher {}: {score}, reason {}\n", i + 1, i + 1));
    }
    text
}

/// One line of a batch output file for a successful request.
pub fn output_line(custom_id: &str, content: &str) -> String {
    serde_json::json!({
        "id": format!("batch_req_{custom_id}"),
        "custom_id": custom_id,
        "response": {
            "status_code": 200,
            "request_id": format!("req_{custom_id}"),
            "body": {
                "object": "chat.completion",
                "choices": [
                    {"index": 0, "message": {"role": "assistant", "content": content}}
                ]
            }
        },
        "error": null
    })
    .to_string()
}
