//! Run statistics and the end-of-run summary
//!
//! This module keeps per-run page counters and prints them once a job
//! finishes.

use crate::state::PageState;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Page counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Count of pages by final state
    pub pages_by_state: HashMap<PageState, u64>,

    /// Rows appended to the output
    pub records_written: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one page
    pub fn record(&mut self, state: PageState) {
        self.record_many(state, 1);
    }

    pub fn record_many(&mut self, state: PageState, count: u64) {
        if count > 0 {
            *self.pages_by_state.entry(state).or_insert(0) += count;
        }
    }

    pub fn count(&self, state: PageState) -> u64 {
        self.pages_by_state.get(&state).copied().unwrap_or(0)
    }

    pub fn completed(&self) -> u64 {
        self.count(PageState::Completed)
    }

    /// Pages that ended in an error state
    pub fn failed(&self) -> u64 {
        self.pages_by_state
            .iter()
            .filter(|(state, _)| state.is_error())
            .map(|(_, count)| count)
            .sum()
    }

    /// Pages that the next run will fetch again
    pub fn pending_retry(&self) -> u64 {
        self.pages_by_state
            .iter()
            .filter(|(state, _)| state.needs_retry())
            .map(|(_, count)| count)
            .sum()
    }
}

/// Result of one finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub job: String,

    /// Page count reported by discovery
    pub total_pages: u32,

    /// Checkpoint loaded at the start of the run
    pub start_frontier: u32,

    /// Checkpoint persisted when the run closed
    pub final_frontier: u32,

    /// Number of page tasks submitted
    pub scheduled: usize,

    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// True if the run was cancelled before its backlog drained
    pub cancelled: bool,
}

impl RunSummary {
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }

    /// True when every page up to the discovered total is checkpointed
    pub fn is_complete(&self) -> bool {
        self.final_frontier >= self.total_pages
    }
}

/// Prints a run summary to stdout in a formatted manner
pub fn print_summary(summary: &RunSummary) {
    println!("=== Job '{}' ===\n", summary.job);

    println!("Overview:");
    println!("  Pages discovered: {}", summary.total_pages);
    println!("  Resumed after page: {}", summary.start_frontier);
    println!("  Pages scheduled: {}", summary.scheduled);
    println!("  Records written: {}", summary.stats.records_written);
    println!("  Duration: {}s", summary.duration_seconds());
    if summary.cancelled {
        println!("  Cancelled before the backlog drained");
    }
    println!();

    println!("Pages by State:");
    let mut state_counts: Vec<_> = summary.stats.pages_by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (state, count) in state_counts {
        let percentage = if summary.total_pages > 0 {
            (*count as f64 / summary.total_pages as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    if summary.is_complete() {
        println!(
            "Checkpoint: page {} of {} (complete)",
            summary.final_frontier, summary.total_pages
        );
    } else {
        println!(
            "Checkpoint: page {} of {} ({} pages left for the next run)",
            summary.final_frontier,
            summary.total_pages,
            summary.total_pages - summary.final_frontier
        );
    }
}
