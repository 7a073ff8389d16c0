//! Output module for persisting extracted records and reporting runs
//!
//! This module handles:
//! - Appending records to a CSV target with resume-safe header handling
//! - Counting page outcomes and printing run summaries

mod csv_sink;
pub mod stats;
mod traits;

pub use csv_sink::CsvSink;
pub use stats::{print_summary, RunStats, RunSummary};
pub use traits::{RecordSink, SinkError, SinkResult};
