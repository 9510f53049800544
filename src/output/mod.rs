//! Output module for harvest summaries
//!
//! This module handles:
//! - Recording run statistics while the runner works
//! - Printing those statistics once a run completes

pub mod stats;

pub use stats::{print_statistics, RunStats};
