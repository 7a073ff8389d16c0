//! Record sink trait and error types
//!
//! This module defines the trait interface for record outputs and the
//! associated error type.

use crate::scrape::Record;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Sink is closed")]
    Closed,
}

/// Result type for output operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Append-only destination for extracted records
///
/// Implementations are shared between concurrently running page tasks, so
/// every method takes `&self` and must never interleave partial rows.
pub trait RecordSink: Send + Sync {
    /// Appends one record
    fn write_record(&self, record: &Record) -> SinkResult<()>;

    /// Appends a page's records as one contiguous block
    ///
    /// Returns the number of records written.
    fn write_page(&self, records: &[Record]) -> SinkResult<usize> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(records.len())
    }

    /// Pushes buffered rows to the underlying file
    fn flush(&self) -> SinkResult<()>;

    /// Flushes and releases the output; later calls are no-ops
    fn close(&self) -> SinkResult<()>;
}
