//! Scrape module for paginated table extraction
//!
//! This module contains the core pipeline, including:
//! - HTTP fetching with linear-backoff retry
//! - Page count discovery from the seed page
//! - Table row extraction into records
//! - A bounded task queue with pause and resume
//! - Run orchestration from discovery to close

mod controller;
mod discovery;
mod extractor;
mod fetcher;
mod job;
mod queue;
mod record;

pub use controller::{reset_job_state, Pipeline, PipelineHandle};
pub use discovery::{max_page_number, PageCountDiscoverer};
pub use extractor::{sanitize_text, ExtractError, RecordExtractor, Records};
pub use fetcher::{
    build_http_client, classify_error, classify_status, FetchError, FetchOutcome, RetryPolicy,
    RetryReason, RetryingFetcher,
};
pub use job::{Job, PageTask};
pub use queue::{TaskFuture, TaskQueue};
pub use record::Record;
