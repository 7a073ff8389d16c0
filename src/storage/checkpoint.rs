//! Contiguous-prefix checkpointing
//!
//! Pages finish in any order. Completions above the frontier wait in a
//! buffer until the gap in front of them closes, and only the contiguous
//! prefix `1..=frontier` is ever persisted. A restart therefore never skips a
//! page that did not complete.

use crate::storage::traits::{CheckpointResult, FrontierStore};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Progress {
    frontier: u32,
    /// Completed pages above the frontier
    pending: BTreeSet<u32>,
}

/// Tracks completed pages and persists the resume frontier
pub struct CheckpointStore {
    store: Box<dyn FrontierStore>,
    loaded: u32,
    progress: Mutex<Progress>,
}

impl CheckpointStore {
    /// Loads the persisted frontier from `store`
    pub fn open(store: Box<dyn FrontierStore>) -> CheckpointResult<Self> {
        let loaded = store.load()?;
        Ok(Self {
            store,
            loaded,
            progress: Mutex::new(Progress {
                frontier: loaded,
                pending: BTreeSet::new(),
            }),
        })
    }

    /// Frontier that was persisted when this store was opened (0 if none)
    pub fn load(&self) -> u32 {
        self.loaded
    }

    /// First page that still needs fetching according to the loaded frontier
    pub fn next_page(&self) -> u32 {
        self.loaded.saturating_add(1)
    }

    /// Largest page N such that pages 1..=N are complete
    pub fn current_frontier(&self) -> u32 {
        self.lock().frontier
    }

    /// True if `page` is known complete
    pub fn is_complete(&self, page: u32) -> bool {
        let progress = self.lock();
        page <= progress.frontier || progress.pending.contains(&page)
    }

    /// Records a completed page and advances the frontier over any closed gap
    ///
    /// Returns the new frontier if it moved. The new value is persisted
    /// before it becomes visible; if persisting fails the in-memory frontier
    /// is left unchanged and the completion stays buffered.
    pub fn mark_complete(&self, page: u32) -> CheckpointResult<Option<u32>> {
        let mut progress = self.lock();
        if page <= progress.frontier {
            return Ok(None);
        }
        progress.pending.insert(page);

        let mut advanced = progress.frontier;
        while progress.pending.contains(&(advanced + 1)) {
            advanced += 1;
        }
        if advanced == progress.frontier {
            return Ok(None);
        }

        self.store.persist(advanced)?;

        let Progress { frontier, pending } = &mut *progress;
        *pending = pending.split_off(&(advanced + 1));
        *frontier = advanced;
        Ok(Some(advanced))
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
