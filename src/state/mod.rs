//! State module for tracking run progress
//!
//! # Components
//!
//! - `PageState`: how a single page ended up in the current run
//! - `RunPhase`: the phase of the pipeline state machine

mod page_state;
mod run_phase;

// Re-export main types
pub use page_state::PageState;
pub use run_phase::RunPhase;
