//! Pipeline controller - one job's run from discovery to close
//!
//! A run walks through `RunPhase`:
//! - Discovering: fetch the seed page and learn the page count
//! - Scheduling: load the checkpoint, open the sink, submit one task per page
//!   after the frontier
//! - Running: tasks fetch, extract, write and checkpoint their page
//! - Draining: wait for the queue to go idle
//! - Closed: close the sink and report
//!
//! A page failure leaves that page for the next run and does not stop the
//! others, unless the job is fail-fast. Checkpoint I/O failures always stop
//! the run.

use crate::events::{EventSink, PipelineEvent};
use crate::output::{CsvSink, RecordSink, RunStats, RunSummary};
use crate::scrape::discovery::PageCountDiscoverer;
use crate::scrape::extractor::RecordExtractor;
use crate::scrape::fetcher::RetryingFetcher;
use crate::scrape::job::{Job, PageTask};
use crate::scrape::queue::TaskQueue;
use crate::scrape::record::Record;
use crate::state::{PageState, RunPhase};
use crate::storage::{CheckpointStore, FileFrontierStore, FrontierStore};
use crate::ScrapeError;
use chrono::Utc;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Runs one job
pub struct Pipeline {
    job: Arc<Job>,
    fetcher: RetryingFetcher,
    events: Arc<dyn EventSink>,
    queue: TaskQueue,
    phase: RunPhase,
    sink: Option<Arc<dyn RecordSink>>,
    frontier_store: Option<Box<dyn FrontierStore>>,
}

/// Cloneable control handle for a running pipeline
#[derive(Clone)]
pub struct PipelineHandle {
    queue: TaskQueue,
}

impl PipelineHandle {
    /// Stops dispatching new pages; running pages finish
    pub fn pause(&self) {
        self.queue.pause();
    }

    pub fn resume(&self) {
        self.queue.resume();
    }

    /// Drops every page that has not started
    ///
    /// The run then drains, closes the sink and returns with the checkpoint
    /// at the completed prefix.
    pub fn cancel(&self) {
        self.queue.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.queue.is_paused()
    }
}

impl Pipeline {
    /// Creates a pipeline writing to the job's CSV output and checkpoint file
    pub fn new(job: Job, fetcher: RetryingFetcher, events: Arc<dyn EventSink>) -> Self {
        let queue = TaskQueue::new(job.concurrency, events.clone());
        Self {
            job: Arc::new(job),
            fetcher,
            events,
            queue,
            phase: RunPhase::Init,
            sink: None,
            frontier_store: None,
        }
    }

    /// Writes records to `sink` instead of the job's CSV output
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Persists the frontier in `store` instead of the job's checkpoint file
    pub fn with_frontier_store(mut self, store: Box<dyn FrontierStore>) -> Self {
        self.frontier_store = Some(store);
        self
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            queue: self.queue.clone(),
        }
    }

    /// Runs the job to completion
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run reached `Closed`; failed pages are counted
    ///   in the summary and will be fetched by the next run
    /// * `Err(ScrapeError)` - Discovery failed, the checkpoint could not be
    ///   read or written, the sink could not be opened or closed, or a page
    ///   failed in a fail-fast job
    pub async fn run(&mut self) -> Result<RunSummary, ScrapeError> {
        let started_at = Utc::now();

        self.transition(RunPhase::Discovering)?;
        self.events.emit(&PipelineEvent::RunStarted {
            job: self.job.name.clone(),
        });

        let discovered = PageCountDiscoverer::new(&self.fetcher)
            .discover(&self.job)
            .await;
        let total = match discovered {
            Ok(total) => total,
            Err(e) => {
                tracing::error!("Job '{}': page count discovery failed: {}", self.job.name, e);
                self.transition(RunPhase::Closed)?;
                return Err(e);
            }
        };
        self.events.emit(&PipelineEvent::PageCountDiscovered {
            job: self.job.name.clone(),
            total,
        });

        self.transition(RunPhase::Scheduling)?;
        let (checkpoint, sink) = match self.open_resources() {
            Ok(resources) => resources,
            Err(e) => {
                tracing::error!("Job '{}': {}", self.job.name, e);
                self.transition(RunPhase::Closed)?;
                return Err(e);
            }
        };

        let start_frontier = checkpoint.load();
        let tasks = self.job.page_tasks(start_frontier, total);
        let scheduled = tasks.len();
        self.events.emit(&PipelineEvent::Scheduled {
            job: self.job.name.clone(),
            frontier: start_frontier,
            pages: scheduled,
        });

        let context = Arc::new(PageContext {
            fetcher: self.fetcher.clone(),
            extractor: RecordExtractor::new(&self.job),
            sink: sink.clone(),
            checkpoint: checkpoint.clone(),
            events: self.events.clone(),
            queue: self.queue.clone(),
            fail_fast: self.job.fail_fast,
            stats: Mutex::new(RunStats::new()),
            fatal: Mutex::new(None),
        });

        for task in tasks {
            let context = context.clone();
            self.queue
                .submit(async move { context.run_page(task).await });
        }

        self.transition(RunPhase::Running)?;
        self.transition(RunPhase::Draining)?;
        self.queue.await_idle().await;

        self.transition(RunPhase::Closed)?;
        let closed = sink.close();

        let mut stats = context.stats();
        stats.record_many(PageState::Skipped, u64::from(start_frontier.min(total)));
        let finished = stats.completed() + stats.failed();
        stats.record_many(PageState::Dropped, (scheduled as u64).saturating_sub(finished));

        let summary = RunSummary {
            job: self.job.name.clone(),
            total_pages: total,
            start_frontier,
            final_frontier: checkpoint.current_frontier(),
            scheduled,
            stats,
            started_at,
            finished_at: Utc::now(),
            cancelled: self.queue.was_cancelled(),
        };
        self.events.emit(&PipelineEvent::RunFinished {
            summary: summary.clone(),
        });

        if let Some(fatal) = context.take_fatal() {
            tracing::error!("Job '{}' stopped: {}", self.job.name, fatal);
            return Err(fatal);
        }
        closed?;
        Ok(summary)
    }

    fn transition(&mut self, to: RunPhase) -> Result<(), ScrapeError> {
        if !self.phase.can_transition_to(to) {
            return Err(ScrapeError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::debug!("Job '{}': {} -> {}", self.job.name, self.phase, to);
        self.phase = to;
        Ok(())
    }

    fn open_resources(
        &mut self,
    ) -> Result<(Arc<CheckpointStore>, Arc<dyn RecordSink>), ScrapeError> {
        let store = self
            .frontier_store
            .take()
            .unwrap_or_else(|| {
                Box::new(FileFrontierStore::for_target(&self.job.output)) as Box<dyn FrontierStore>
            });
        let checkpoint = Arc::new(CheckpointStore::open(store)?);

        let sink: Arc<dyn RecordSink> = match &self.sink {
            Some(sink) => sink.clone(),
            None => Arc::new(CsvSink::open(&self.job.output, &self.job.columns)?),
        };
        Ok((checkpoint, sink))
    }
}

/// Deletes a job's checkpoint and output so the next run starts at page 1
pub fn reset_job_state(job: &Job) -> Result<(), ScrapeError> {
    FileFrontierStore::for_target(&job.output).reset()?;
    match std::fs::remove_file(&job.output) {
        Ok(()) => tracing::info!("Removed {}", job.output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Everything a page task shares with the run
struct PageContext {
    fetcher: RetryingFetcher,
    extractor: RecordExtractor,
    sink: Arc<dyn RecordSink>,
    checkpoint: Arc<CheckpointStore>,
    events: Arc<dyn EventSink>,
    queue: TaskQueue,
    fail_fast: bool,
    stats: Mutex<RunStats>,
    /// First run-fatal error, if any
    fatal: Mutex<Option<ScrapeError>>,
}

/// Why a page did not complete
struct PageFailure {
    state: PageState,
    message: String,
    /// Set when the failure must stop the whole run
    fatal: Option<ScrapeError>,
}

impl PageFailure {
    fn new(state: PageState, error: impl Display) -> Self {
        Self {
            state,
            message: error.to_string(),
            fatal: None,
        }
    }

    fn fatal(state: PageState, error: ScrapeError) -> Self {
        Self {
            state,
            message: error.to_string(),
            fatal: Some(error),
        }
    }
}

impl PageContext {
    async fn run_page(&self, task: PageTask) -> Result<(), ScrapeError> {
        let page = task.page;
        match self.process(&task).await {
            Ok(records) => {
                {
                    let mut stats = self.lock_stats();
                    stats.record(PageState::Completed);
                    stats.records_written += records as u64;
                }
                self.events
                    .emit(&PipelineEvent::PageSucceeded { page, records });
                Ok(())
            }
            Err(failure) => {
                self.lock_stats().record(failure.state);
                self.events.emit(&PipelineEvent::PageFailed {
                    page,
                    error: failure.message.clone(),
                });

                let message = failure.message;
                if let Some(fatal) = failure.fatal {
                    self.stop(fatal);
                } else if self.fail_fast {
                    self.stop(ScrapeError::PageFailed {
                        page,
                        message: message.clone(),
                    });
                }
                Err(ScrapeError::PageFailed { page, message })
            }
        }
    }

    /// Fetch, extract, write and checkpoint one page
    ///
    /// Returns the number of records written.
    async fn process(&self, task: &PageTask) -> Result<usize, PageFailure> {
        let page = task.page;
        let events = self.events.clone();
        let outcome = self
            .fetcher
            .fetch_observed(task.url.as_str(), move |attempt| {
                events.emit(&PipelineEvent::PageAttempt { page, attempt })
            })
            .await
            .map_err(|e| PageFailure::new(PageState::FetchFailed, e))?;

        if !outcome.is_success() {
            return Err(PageFailure::new(
                PageState::HttpError,
                format!("HTTP {} from {}", outcome.status, task.url),
            ));
        }

        let records = self.extract_page(&outcome.body)?;

        // Writes, flushes and the checkpoint fsync block
        let sink = self.sink.clone();
        let checkpoint = self.checkpoint.clone();
        let (written, advanced) = tokio::task::spawn_blocking(move || {
            commit_page(sink.as_ref(), &checkpoint, page, &records)
        })
        .await
        .map_err(|e| PageFailure::new(PageState::SinkFailed, e))??;

        if let Some(frontier) = advanced {
            self.events
                .emit(&PipelineEvent::CheckpointAdvanced { frontier });
        }
        Ok(written)
    }

    /// Parses a page body and collects its records
    ///
    /// Kept synchronous: the parsed document is not `Send` and must never be
    /// held across an await point.
    fn extract_page(&self, body: &str) -> Result<Vec<Record>, PageFailure> {
        let document = self
            .extractor
            .parse(body)
            .map_err(|e| PageFailure::new(PageState::ExtractFailed, e))?;
        Ok(self.extractor.records(&document).collect())
    }

    /// Records the first run-fatal error and cancels the backlog
    fn stop(&self, error: ScrapeError) {
        {
            let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
            if fatal.is_none() {
                *fatal = Some(error);
            }
        }
        self.queue.cancel();
    }

    fn take_fatal(&self) -> Option<ScrapeError> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn stats(&self) -> RunStats {
        self.lock_stats().clone()
    }

    fn lock_stats(&self) -> MutexGuard<'_, RunStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Writes and flushes a page's records, then marks the page complete
///
/// Returns the number of records written and the new frontier if it moved.
/// A checkpoint failure is fatal to the run.
fn commit_page(
    sink: &dyn RecordSink,
    checkpoint: &CheckpointStore,
    page: u32,
    records: &[Record],
) -> Result<(usize, Option<u32>), PageFailure> {
    let written = sink
        .write_page(records)
        .map_err(|e| PageFailure::new(PageState::SinkFailed, e))?;
    sink.flush()
        .map_err(|e| PageFailure::new(PageState::SinkFailed, e))?;

    let advanced = checkpoint
        .mark_complete(page)
        .map_err(|e| PageFailure::fatal(PageState::CheckpointFailed, e.into()))?;
    Ok((written, advanced))
}
