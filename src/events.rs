//! Pipeline events and the sinks that observe them
//!
//! Components never log run milestones through a global; they receive an
//! `Arc<dyn EventSink>` at construction and emit `PipelineEvent`s after the
//! state change an event describes has happened. `TracingEventSink` is the
//! default sink and forwards everything to `tracing`.

use crate::output::RunSummary;
use std::sync::{Mutex, PoisonError};

/// Queue state transitions reported by the task queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// A task entered the backlog
    Added { pending: usize },
    /// A task left the backlog and started
    Active { active: usize, pending: usize },
    /// A task finished (successfully or not)
    Completed { active: usize, pending: usize },
    /// The backlog became empty
    Empty,
    /// Nothing pending and nothing running
    Idle,
    Paused,
    Resumed,
    /// Backlog dropped by a cancel
    Cancelled { dropped: usize },
}

/// Structured events emitted while a job runs
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted { job: String },
    PageCountDiscovered { job: String, total: u32 },
    Scheduled { job: String, frontier: u32, pages: usize },
    PageAttempt { page: u32, attempt: u32 },
    PageSucceeded { page: u32, records: usize },
    PageFailed { page: u32, error: String },
    Queue(QueueEvent),
    CheckpointAdvanced { frontier: u32 },
    RunFinished { summary: RunSummary },
}

/// Receiver of pipeline events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { job } => tracing::info!("Starting job '{}'", job),
            PipelineEvent::PageCountDiscovered { job, total } => {
                tracing::info!("Job '{}' has {} pages", job, total)
            }
            PipelineEvent::Scheduled {
                job,
                frontier,
                pages,
            } => tracing::info!(
                "Job '{}': resuming after page {}, {} pages scheduled",
                job,
                frontier,
                pages
            ),
            PipelineEvent::PageAttempt { page, attempt } => {
                tracing::debug!("Fetching page {} (attempt {})", page, attempt)
            }
            PipelineEvent::PageSucceeded { page, records } => {
                tracing::debug!("Page {} done: {} records", page, records)
            }
            PipelineEvent::PageFailed { page, error } => {
                tracing::warn!("Page {} failed: {}", page, error)
            }
            PipelineEvent::Queue(queue) => match queue {
                QueueEvent::Paused => tracing::info!("Queue paused"),
                QueueEvent::Resumed => tracing::info!("Queue resumed"),
                QueueEvent::Cancelled { dropped } => {
                    tracing::info!("Queue cancelled, {} pending tasks dropped", dropped)
                }
                QueueEvent::Idle => tracing::debug!("Queue idle"),
                other => tracing::trace!("Queue: {:?}", other),
            },
            PipelineEvent::CheckpointAdvanced { frontier } => {
                tracing::debug!("Checkpoint advanced to page {}", frontier)
            }
            PipelineEvent::RunFinished { summary } => tracing::info!(
                "Job '{}' finished: {} completed, {} failed, {} records, checkpoint at page {}",
                summary.job,
                summary.stats.completed(),
                summary.stats.failed(),
                summary.stats.records_written,
                summary.final_frontier
            ),
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the events seen so far
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Frontier values from every `CheckpointAdvanced` event
    pub fn checkpoints(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::CheckpointAdvanced { frontier } => Some(frontier),
                _ => None,
            })
            .collect()
    }

    /// Page numbers from every `PageAttempt` event with attempt 1
    pub fn started_pages(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::PageAttempt { page, attempt: 1 } => Some(page),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
