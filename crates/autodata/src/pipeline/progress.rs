//! Progress reporting and cancellation support for the pipeline.
//!
//! This module provides types for tracking pipeline progress and supporting
//! cancellation from external threads (e.g., a CLI signal handler or a UI
//! cancel button).
//!
//! # Example
//!
//! ```rust,ignore
//! use autodata::{Pipeline, CancellationToken};
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! // In another thread
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     token_clone.cancel();
//! });
//!
//! let result = Pipeline::builder()
//!     .cancellation_token(token)
//!     .on_progress(|update| {
//!         println!("[{:?}] {}", update.stage, update.message);
//!     })
//!     .build()?
//!     .process(table);
//! ```

use crate::cleaner::CleaningStage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stages of the clean-then-analyze pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Pipeline is initializing and validating configuration
    Initializing,
    /// Removing exact duplicate rows
    Deduplicating,
    /// Normalizing column names
    NormalizingNames,
    /// Imputing missing values
    Imputing,
    /// Coercing columns to requested types
    CoercingTypes,
    /// Removing outlier rows
    RemovingOutliers,
    /// Running batched AI analysis
    Analyzing,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline was cancelled by user
    Cancelled,
    /// Pipeline failed with an error
    Failed,
}

impl PipelineStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Deduplicating => "Removing Duplicates",
            Self::NormalizingNames => "Normalizing Names",
            Self::Imputing => "Imputing Values",
            Self::CoercingTypes => "Coercing Types",
            Self::RemovingOutliers => "Removing Outliers",
            Self::Analyzing => "Analyzing Batches",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Returns the typical weight of this stage in the overall pipeline (0.0 - 1.0).
    ///
    /// Analysis dominates wall time because every batch is a remote call.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::Deduplicating => 0.08,
            Self::NormalizingNames => 0.05,
            Self::Imputing => 0.20,
            Self::CoercingTypes => 0.10,
            Self::RemovingOutliers => 0.10,
            Self::Analyzing => 0.45,
            Self::Complete | Self::Cancelled | Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::Deduplicating => 0.02,
            Self::NormalizingNames => 0.10,
            Self::Imputing => 0.15,
            Self::CoercingTypes => 0.35,
            Self::RemovingOutliers => 0.45,
            Self::Analyzing => 0.55,
            Self::Complete => 1.0,
            Self::Cancelled | Self::Failed => 0.0,
        }
    }
}

impl From<CleaningStage> for PipelineStage {
    fn from(stage: CleaningStage) -> Self {
        match stage {
            CleaningStage::Deduplicating => Self::Deduplicating,
            CleaningStage::NormalizingNames => Self::NormalizingNames,
            CleaningStage::Imputing => Self::Imputing,
            CleaningStage::CoercingTypes => Self::CoercingTypes,
            CleaningStage::RemovingOutliers => Self::RemovingOutliers,
        }
    }
}

/// Detailed progress update with sub-stage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: PipelineStage,

    /// Optional sub-stage description (e.g., "Batch 2/3")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    /// Human-readable message describing current activity
    pub message: String,

    /// Number of items processed in current stage (for iterative operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    /// Total items in current stage (for iterative operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    fn terminal(stage: PipelineStage, progress: f32, message: String) -> Self {
        Self {
            stage,
            sub_stage: None,
            progress,
            stage_progress: progress,
            message,
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a new progress update for a stage without sub-stage info.
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a new progress update with item counts.
    pub fn with_items(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            sub_stage: Some(sub_stage.into()),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::new(stage, stage_progress, message)
        }
    }

    /// Creates a completion progress update.
    pub fn complete(message: impl Into<String>) -> Self {
        Self::terminal(PipelineStage::Complete, 1.0, message.into())
    }

    /// Creates a cancelled progress update.
    pub fn cancelled() -> Self {
        Self::terminal(
            PipelineStage::Cancelled,
            0.0,
            "Pipeline cancelled by user".to_string(),
        )
    }

    /// Creates a failed progress update.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::terminal(PipelineStage::Failed, 0.0, message.into())
    }
}

/// Trait for receiving progress updates.
///
/// Implementations must be `Send + Sync`: batch analysis reports from
/// worker threads when it runs concurrently.
pub trait ProgressReporter: Send + Sync {
    /// Called when progress is made. May be called once per batch, so keep
    /// it cheap and non-blocking.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
///
/// # Example
///
/// ```rust,ignore
/// use autodata::Pipeline;
///
/// Pipeline::builder()
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .process(table);
/// ```
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Token for cancelling a running pipeline or analysis.
///
/// Cloning shares the flag. The pipeline checks it between cleaning stages;
/// the orchestrator checks it before dispatching each batch and returns
/// [`AutodataError::Cancelled`](crate::error::AutodataError::Cancelled).
/// Batches already running are allowed to finish.
///
/// # Example
///
/// ```rust,ignore
/// use autodata::{CancellationToken, AutodataError, Pipeline};
///
/// let token = CancellationToken::new();
/// let token_for_cancel = token.clone();
///
/// std::thread::spawn(move || {
///     std::thread::sleep(std::time::Duration::from_secs(10));
///     token_for_cancel.cancel();
/// });
///
/// match Pipeline::builder().cancellation_token(token).build()?.process(table) {
///     Err(AutodataError::Cancelled) => println!("Pipeline was cancelled"),
///     Ok(_) => println!("Pipeline completed"),
///     Err(e) => println!("Pipeline failed: {}", e),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    /// Creates a new cancellation token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested on this token or any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
