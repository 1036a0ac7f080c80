//! arXiv digest pipeline
//!
//! Fetches a day's arXiv listing, scores every abstract against a set of
//! reader profiles through an asynchronous LLM batch API, tracks the batch
//! until it resolves, and renders one ranked Markdown digest per reader.

pub mod app_state;
pub mod config;
pub mod ledger;
pub mod models;
pub mod services;
