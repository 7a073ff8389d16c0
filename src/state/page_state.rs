/// Page state definitions for tracking run progress
///
/// This module defines the outcome a page can reach during one run.
use std::fmt;

/// Represents how a page ended up in the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    // ===== Skip States =====
    /// Page is at or below the loaded checkpoint and was not scheduled
    Skipped,

    // ===== Terminal Success States =====
    /// Page was fetched, extracted, written and checkpointed
    Completed,

    // ===== Terminal Error States =====
    /// Server answered with a non-success status that is not retried
    HttpError,

    /// Transport failure or retry budget exhausted
    FetchFailed,

    /// Markup could not be turned into records
    ExtractFailed,

    /// Records could not be written to the output
    SinkFailed,

    /// Records were written but the advanced frontier could not be persisted
    CheckpointFailed,

    // ===== Special States =====
    /// Page was scheduled but dropped from the backlog before it started
    Dropped,
}

impl PageState {
    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the page will be fetched again by the next run
    pub fn needs_retry(&self) -> bool {
        !matches!(self, Self::Completed | Self::Skipped)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::HttpError
                | Self::FetchFailed
                | Self::ExtractFailed
                | Self::SinkFailed
                | Self::CheckpointFailed
        )
    }

    /// Converts the page state to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Completed => "completed",
            Self::HttpError => "http_error",
            Self::FetchFailed => "fetch_failed",
            Self::ExtractFailed => "extract_failed",
            Self::SinkFailed => "sink_failed",
            Self::CheckpointFailed => "checkpoint_failed",
            Self::Dropped => "dropped",
        }
    }

    /// Parses a page state from its string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "skipped" => Some(Self::Skipped),
            "completed" => Some(Self::Completed),
            "http_error" => Some(Self::HttpError),
            "fetch_failed" => Some(Self::FetchFailed),
            "extract_failed" => Some(Self::ExtractFailed),
            "sink_failed" => Some(Self::SinkFailed),
            "checkpoint_failed" => Some(Self::CheckpointFailed),
            "dropped" => Some(Self::Dropped),
            _ => None,
        }
    }

    /// Returns all possible page states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Skipped,
            Self::Completed,
            Self::HttpError,
            Self::FetchFailed,
            Self::ExtractFailed,
            Self::SinkFailed,
            Self::CheckpointFailed,
            Self::Dropped,
        ]
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
