//! Storage module for resume state
//!
//! This module handles everything that must survive a crash:
//! - The resume frontier and its atomic on-disk representation
//! - Buffering of out-of-order page completions until the prefix is contiguous

mod checkpoint;
mod file_store;
mod traits;

pub use checkpoint::CheckpointStore;
pub use file_store::FileFrontierStore;
pub use traits::{CheckpointError, CheckpointResult, FrontierStore};

use std::path::Path;

/// Opens the checkpoint that belongs to an output target
///
/// # Arguments
///
/// * `output` - Path of the CSV output; the checkpoint lives next to it
///
/// # Returns
///
/// * `Ok(CheckpointStore)` - Store primed with the persisted frontier
/// * `Err(CheckpointError)` - The checkpoint exists but could not be read
pub fn open_checkpoint(output: &Path) -> CheckpointResult<CheckpointStore> {
    CheckpointStore::open(Box::new(FileFrontierStore::for_target(output)))
}
