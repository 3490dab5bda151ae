//! Pipeline module.
//!
//! This module provides the clean-then-analyze pipeline together with its
//! progress reporting and cancellation types.

mod builder;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder};
pub use progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
