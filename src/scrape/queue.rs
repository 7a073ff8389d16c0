//! Bounded task queue with pause and resume
//!
//! Tasks wait in a FIFO backlog and are started on the tokio runtime while
//! fewer than `limit` are running and the queue is not paused. Pausing only
//! stops dispatch; tasks already running are never interrupted.
//!
//! Every task runs inside its own spawned tokio task, so an error or a panic
//! in one page never stops the others. Either way the slot is released and the
//! failure is counted.

use crate::events::{EventSink, PipelineEvent, QueueEvent};
use crate::ScrapeError;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// A unit of work accepted by the queue
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), ScrapeError>> + Send + 'static>>;

/// Cloneable handle to a shared task queue
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

struct Shared {
    limit: usize,
    state: Mutex<QueueState>,
    /// `true` while the backlog is empty and nothing runs
    idle: watch::Sender<bool>,
    events: Arc<dyn EventSink>,
}

#[derive(Default)]
struct QueueState {
    backlog: VecDeque<TaskFuture>,
    active: usize,
    paused: bool,
    cancelled: bool,
    failures: usize,
}

impl TaskQueue {
    /// Creates a queue running at most `limit` tasks at once
    pub fn new(limit: usize, events: Arc<dyn EventSink>) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                limit: limit.max(1),
                state: Mutex::new(QueueState::default()),
                idle,
                events,
            }),
        }
    }

    /// Adds a task to the backlog, starting it if a slot is free
    ///
    /// Must be called from within a tokio runtime. Returns `false` if the
    /// queue was cancelled and the task was dropped.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: Future<Output = Result<(), ScrapeError>> + Send + 'static,
    {
        let mut events = Vec::new();
        let ready = {
            let mut state = self.lock();
            if state.cancelled {
                return false;
            }
            state.backlog.push_back(Box::pin(task));
            events.push(QueueEvent::Added {
                pending: state.backlog.len(),
            });
            self.shared.idle.send_replace(false);
            self.dispatch(&mut state, &mut events)
        };

        self.emit(events);
        for task in ready {
            self.spawn(task);
        }
        true
    }

    /// Stops starting new tasks
    pub fn pause(&self) {
        let changed = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.paused, true)
        };
        if changed {
            self.emit(vec![QueueEvent::Paused]);
        }
    }

    /// Starts dispatching from the backlog again
    pub fn resume(&self) {
        let mut events = Vec::new();
        let ready = {
            let mut state = self.lock();
            if !state.paused || state.cancelled {
                return;
            }
            state.paused = false;
            events.push(QueueEvent::Resumed);
            self.dispatch(&mut state, &mut events)
        };

        self.emit(events);
        for task in ready {
            self.spawn(task);
        }
    }

    /// Pauses for good and drops every task that has not started
    ///
    /// Later submissions are rejected. Running tasks finish normally.
    pub fn cancel(&self) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.paused = true;
            let dropped = state.backlog.len();
            state.backlog.clear();
            events.push(QueueEvent::Cancelled { dropped });
            self.settle(&state, &mut events);
        }
        self.emit(events);
    }

    /// Waits until the backlog is empty and no task is running
    pub async fn await_idle(&self) {
        let mut idle = self.shared.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Number of tasks waiting to start
    pub fn pending(&self) -> usize {
        self.lock().backlog.len()
    }

    /// Number of tasks running
    pub fn active(&self) -> usize {
        self.lock().active
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn was_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Number of tasks that returned an error or panicked
    pub fn failures(&self) -> usize {
        self.lock().failures
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves tasks from the backlog into free slots
    fn dispatch(&self, state: &mut QueueState, events: &mut Vec<QueueEvent>) -> Vec<TaskFuture> {
        let mut ready = Vec::new();
        while !state.paused && state.active < self.shared.limit {
            let Some(task) = state.backlog.pop_front() else {
                break;
            };
            state.active += 1;
            events.push(QueueEvent::Active {
                active: state.active,
                pending: state.backlog.len(),
            });
            if state.backlog.is_empty() {
                events.push(QueueEvent::Empty);
            }
            ready.push(task);
        }
        ready
    }

    /// Publishes idleness if nothing is left
    fn settle(&self, state: &QueueState, events: &mut Vec<QueueEvent>) {
        if state.active == 0 && state.backlog.is_empty() {
            let was_idle = self.shared.idle.send_replace(true);
            if !was_idle {
                events.push(QueueEvent::Idle);
            }
        }
    }

    fn spawn(&self, task: TaskFuture) {
        let queue = self.clone();
        tokio::spawn(async move {
            let failed = match tokio::spawn(task).await {
                Ok(Ok(())) => false,
                Ok(Err(e)) => {
                    tracing::debug!("Queued task failed: {}", e);
                    true
                }
                Err(e) => {
                    tracing::error!("Queued task panicked: {}", e);
                    true
                }
            };
            queue.finish(failed);
        });
    }

    fn finish(&self, failed: bool) {
        let mut events = Vec::new();
        let ready = {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
            if failed {
                state.failures += 1;
            }
            events.push(QueueEvent::Completed {
                active: state.active,
                pending: state.backlog.len(),
            });
            let ready = self.dispatch(&mut state, &mut events);
            self.settle(&state, &mut events);
            ready
        };

        self.emit(events);
        for task in ready {
            self.spawn(task);
        }
    }

    fn emit(&self, events: Vec<QueueEvent>) {
        for event in events {
            self.shared.events.emit(&PipelineEvent::Queue(event));
        }
    }
}
