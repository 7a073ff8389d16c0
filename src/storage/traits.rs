//! Storage traits and error types
//!
//! This module defines the trait interface for persisting the resume
//! frontier and the associated error type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or persisting a checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt checkpoint at {path}: {content:?}")]
    Corrupt { path: PathBuf, content: String },
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Durable home of a single resume frontier
///
/// Implementations must make `persist` atomic: a reader after a crash sees
/// either the previous value or the new one, never a partial write.
pub trait FrontierStore: Send + Sync {
    /// Loads the persisted frontier, 0 if none was ever written
    fn load(&self) -> CheckpointResult<u32>;

    /// Replaces the persisted frontier
    fn persist(&self, frontier: u32) -> CheckpointResult<()>;

    /// Forgets the persisted frontier
    fn reset(&self) -> CheckpointResult<()>;
}
