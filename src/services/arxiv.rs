//! arXiv listing client
//!
//! Pages through the arXiv query API (Atom feed, newest submissions first)
//! and keeps the entries published on a given day.
//!
//! API reference: <https://info.arxiv.org/help/api/user-manual.html>

use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::ledger::file_store::{read_json, write_json_atomic};
use crate::ledger::StoreError;
use crate::models::paper::PaperRecord;

const ABS_URL_PREFIXES: [&str; 2] = ["http://arxiv.org/abs/", "https://arxiv.org/abs/"];

/// Entries requested per page.
pub const PAGE_SIZE: usize = 100;

/// Hard cap on entries scanned for one day.
pub const MAX_RESULTS: usize = 1000;

/// Client for the arXiv query API.
pub struct ArxivClient {
    http: reqwest::Client,
    base_url: String,
}

impl ArxivClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ArxivError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("arxiv-digest/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch every entry in `category` published on `date`.
    pub async fn fetch_day(
        &self,
        category: &str,
        date: NaiveDate,
    ) -> Result<Vec<PaperRecord>, ArxivError> {
        let scan = scan_day(date, |start, max_results| {
            self.fetch_page(category, start, max_results)
        })
        .await?;

        if scan.truncated {
            tracing::warn!(
                category = %category,
                date = %date,
                limit = MAX_RESULTS,
                "Hit the listing limit before reaching older entries, results may be incomplete"
            );
        }

        tracing::info!(
            category = %category,
            date = %date,
            entries = scan.papers.len(),
            pages = scan.pages,
            "Fetched arXiv listing"
        );
        Ok(scan.papers)
    }

    async fn fetch_page(
        &self,
        category: &str,
        start: usize,
        max_results: usize,
    ) -> Result<Vec<PaperRecord>, ArxivError> {
        let search_query = format!("cat:{category}");
        let start = start.to_string();
        let max_results = max_results.to_string();

        let response = self
            .http
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", start.as_str()),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ArxivError::Unavailable(format!(
                "arXiv returned HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_feed(&body)
    }
}

/// Result of paging through a listing for one day.
#[derive(Debug)]
pub struct DayScan {
    pub papers: Vec<PaperRecord>,
    pub pages: usize,
    /// The hard limit was reached without passing `date`.
    pub truncated: bool,
}

/// Page through a newest-first listing, keeping entries published on `date`.
///
/// `fetch_page(start, max_results)` returns one page. Paging stops at the
/// first entry older than `date`, at a short page, or after [`MAX_RESULTS`]
/// entries.
pub async fn scan_day<F, Fut>(date: NaiveDate, mut fetch_page: F) -> Result<DayScan, ArxivError>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<PaperRecord>, ArxivError>>,
{
    let mut scan = DayScan {
        papers: Vec::new(),
        pages: 0,
        truncated: true,
    };

    for start in (0..MAX_RESULTS).step_by(PAGE_SIZE) {
        let max_results = PAGE_SIZE.min(MAX_RESULTS - start);
        let page = fetch_page(start, max_results).await?;
        scan.pages += 1;
        let page_len = page.len();

        let (mut matched, older_seen) = select_day(page, date);
        scan.papers.append(&mut matched);

        if older_seen || page_len < max_results {
            scan.truncated = false;
            break;
        }
    }

    Ok(scan)
}

/// Keep entries published on `date`; the flag reports whether an older
/// entry was seen, which ends paging.
pub fn select_day(entries: Vec<PaperRecord>, date: NaiveDate) -> (Vec<PaperRecord>, bool) {
    let mut matched = Vec::new();
    for entry in entries {
        let published = entry.published.date_naive();
        if published == date {
            matched.push(entry);
        } else if published < date {
            return (matched, true);
        }
    }
    (matched, false)
}

/// Parse an Atom feed page into paper records.
///
/// Entries missing an id or a parseable `published` timestamp are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<PaperRecord>, ArxivError> {
    let document = Html::parse_document(xml);
    let entry_sel = selector("entry")?;
    let id_sel = selector("id")?;
    let title_sel = selector("title")?;
    let summary_sel = selector("summary")?;
    let published_sel = selector("published")?;
    let author_name_sel = selector("author name")?;
    let alt_link_sel = selector(r#"link[rel="alternate"]"#)?;
    let category_sel = selector("category")?;

    let mut records = Vec::new();
    for entry in document.select(&entry_sel) {
        let Some(raw_id) = first_text(&entry, &id_sel) else {
            continue;
        };
        let id = ABS_URL_PREFIXES
            .iter()
            .find_map(|prefix| raw_id.strip_prefix(prefix))
            .unwrap_or(raw_id.as_str())
            .to_string();

        let Some(published) = first_text(&entry, &published_sel)
            .and_then(|p| DateTime::parse_from_rfc3339(&p).ok())
            .map(|p| p.with_timezone(&Utc))
        else {
            tracing::warn!(id = %id, "Skipping arXiv entry without a valid published date");
            continue;
        };

        let link = entry
            .select(&alt_link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string)
            .unwrap_or_else(|| raw_id.clone());

        let mut tags: Vec<String> = Vec::new();
        for term in entry
            .select(&category_sel)
            .filter_map(|c| c.value().attr("term"))
        {
            if !tags.iter().any(|t| t == term) {
                tags.push(term.to_string());
            }
        }

        records.push(PaperRecord {
            id,
            title: first_text(&entry, &title_sel).unwrap_or_default(),
            abstract_text: first_text(&entry, &summary_sel).unwrap_or_default(),
            authors: entry
                .select(&author_name_sel)
                .map(|n| collapse_whitespace(&n.text().collect::<String>()))
                .collect(),
            link,
            tags,
            published,
        });
    }

    Ok(records)
}

/// Load the cached listing for `date`, or fetch and cache it.
pub async fn cached_day(
    client: &ArxivClient,
    cache_dir: &Path,
    category: &str,
    date: NaiveDate,
    refresh: bool,
) -> Result<Vec<PaperRecord>, ArxivError> {
    let path = cache_dir.join(format!("{date}.json"));

    if !refresh && path.exists() {
        let papers: Vec<PaperRecord> = read_json(&path)?;
        tracing::info!(path = %path.display(), entries = papers.len(), "Using cached arXiv listing");
        return Ok(papers);
    }

    let papers = client.fetch_day(category, date).await?;
    std::fs::create_dir_all(cache_dir).map_err(|source| StoreError::Io {
        path: cache_dir.to_path_buf(),
        source,
    })?;
    write_json_atomic(&path, &papers)?;
    Ok(papers)
}

/// Read the cached listing for `date` without touching the network.
pub fn load_cached_day(cache_dir: &Path, date: NaiveDate) -> Result<Vec<PaperRecord>, ArxivError> {
    Ok(read_json(&cache_dir.join(format!("{date}.json")))?)
}

fn selector(css: &str) -> Result<Selector, ArxivError> {
    Selector::parse(css).map_err(|e| ArxivError::Parse(format!("bad selector {css}: {e}")))
}

fn first_text(entry: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    entry
        .select(sel)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum ArxivError {
    #[error("HTTP request to arXiv failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse arXiv feed: {0}")]
    Parse(String),

    #[error("arXiv unavailable: {0}")]
    Unavailable(String),

    #[error("Abstract cache error: {0}")]
    Cache(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=cat:cs.LG</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2409.08123v1</id>
    <updated>2024-09-12T17:59:52Z</updated>
    <published>2024-09-12T17:59:52Z</published>
    <title>Scaling Laws for
      Sparse Mixtures</title>
    <summary>  We study sparse
  mixtures of experts.
</summary>
    <author>
      <name>Ada Lovelace</name>
    </author>
    <author>
      <name>Alan Turing</name>
    </author>
    <link href="http://arxiv.org/abs/2409.08123v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2409.08123v1" rel="related" type="application/pdf"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="stat.ML" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2409.07001v2</id>
    <published>2024-09-11T09:00:00Z</published>
    <title>Yesterday's Paper</title>
    <summary>Older.</summary>
    <author><name>Grace Hopper</name></author>
    <link href="http://arxiv.org/abs/2409.07001v2" rel="alternate" type="text/html"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    #[test]
    fn test_parse_feed_entries() {
        let records = parse_feed(FEED).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.id, "2409.08123v1");
        assert_eq!(first.title, "Scaling Laws for Sparse Mixtures");
        assert_eq!(first.abstract_text, "We study sparse mixtures of experts.");
        assert_eq!(first.authors, ["Ada Lovelace", "Alan Turing"]);
        assert_eq!(first.link, "http://arxiv.org/abs/2409.08123v1");
        assert_eq!(first.tags, ["cs.LG", "stat.ML"]);
        assert_eq!(first.published.date_naive(), day(12));

        assert_eq!(records[1].authors, ["Grace Hopper"]);
    }

    #[test]
    fn test_parse_empty_feed() {
        let xml = r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"><title>empty</title></feed>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_select_day_stops_at_older_entry() {
        let records = parse_feed(FEED).unwrap();
        let (matched, older_seen) = select_day(records, day(12));
        assert_eq!(matched.len(), 1);
        assert!(older_seen);
    }

    #[test]
    fn test_select_day_skips_newer_entries() {
        let records = parse_feed(FEED).unwrap();
        let (matched, older_seen) = select_day(records, day(11));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "2409.07001v2");
        assert!(!older_seen);
    }

    fn entry(id: usize, d: u32) -> PaperRecord {
        PaperRecord {
            id: format!("2409.{id:05}"),
            title: String::new(),
            abstract_text: String::new(),
            authors: vec![],
            link: String::new(),
            tags: vec![],
            published: Utc.with_ymd_and_hms(2024, 9, d, 12, 0, 0).unwrap(),
        }
    }

    /// Serves `pages` in order and records every request.
    async fn scan(pages: Vec<Vec<PaperRecord>>, date: NaiveDate) -> (DayScan, Vec<(usize, usize)>) {
        let mut requests = Vec::new();
        let result = scan_day(date, |start, max_results| {
            requests.push((start, max_results));
            let page = pages.get(start / PAGE_SIZE).cloned().unwrap_or_default();
            async move { Ok(page) }
        })
        .await
        .unwrap();
        (result, requests)
    }

    #[tokio::test]
    async fn test_scan_spans_pages_until_older_entry() {
        let first: Vec<_> = (0..50).map(|i| entry(i, 13)).chain((50..100).map(|i| entry(i, 12))).collect();
        let second: Vec<_> = (100..130).map(|i| entry(i, 12)).chain((130..200).map(|i| entry(i, 11))).collect();
        let third = vec![entry(999, 12)];

        let (result, requests) = scan(vec![first, second, third], day(12)).await;

        assert_eq!(requests, [(0, 100), (100, 100)]);
        assert_eq!(result.pages, 2);
        assert_eq!(result.papers.len(), 80);
        assert_eq!(result.papers[0].id, "2409.00050");
        assert_eq!(result.papers[79].id, "2409.00129");
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_scan_stops_at_short_page() {
        let first: Vec<_> = (0..100).map(|i| entry(i, 12)).collect();
        let second: Vec<_> = (100..140).map(|i| entry(i, 12)).collect();

        let (result, requests) = scan(vec![first, second], day(12)).await;

        assert_eq!(requests.len(), 2);
        assert_eq!(result.papers.len(), 140);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_scan_honours_hard_limit() {
        let pages: Vec<Vec<PaperRecord>> = (0..12)
            .map(|p| (p * PAGE_SIZE..(p + 1) * PAGE_SIZE).map(|i| entry(i, 12)).collect())
            .collect();

        let (result, requests) = scan(pages, day(12)).await;

        assert_eq!(requests.len(), MAX_RESULTS / PAGE_SIZE);
        assert_eq!(requests.last(), Some(&(900, 100)));
        assert_eq!(result.papers.len(), MAX_RESULTS);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_scan_propagates_page_errors() {
        let err = scan_day(day(12), |_, _| async {
            Err::<Vec<PaperRecord>, _>(ArxivError::Unavailable("HTTP 503".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ArxivError::Unavailable(_)));
    }

    #[test]
    fn test_cached_listing_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let papers = parse_feed(FEED).unwrap();
        write_json_atomic(&dir.path().join("2024-09-12.json"), &papers).unwrap();

        let loaded = load_cached_day(dir.path(), day(12)).unwrap();
        assert_eq!(loaded, papers);
        assert!(matches!(
            load_cached_day(dir.path(), day(13)),
            Err(ArxivError::Cache(StoreError::Missing(_)))
        ));
    }
}
