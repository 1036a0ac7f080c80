pub mod arxiv;
pub mod batch_api;
pub mod digest;
pub mod extraction;
pub mod poller;
pub mod retry;
pub mod submitter;
pub mod tracker;
