//! Autodata Library
//!
//! Rule-based table cleaning with batched, failure-isolated AI analysis,
//! built on Polars.
//!
//! # Overview
//!
//! - **Cleaning**: duplicate removal, column name normalization, missing
//!   value imputation, type coercion and outlier removal, each reporting
//!   exactly what it did per column
//! - **Analysis**: a table is split into fixed-size row batches and each
//!   batch is sent to an [`ai::AnalysisCapability`]; one failing batch never
//!   aborts the others
//! - **Progress Reporting**: stage and batch updates with cancellation support
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use autodata::{Pipeline, CleaningConfig, MissingValueStrategy, TableHandle};
//! use autodata::ai::GeminiCapability;
//! use std::sync::Arc;
//!
//! let table = TableHandle::from_csv_path("data.csv")?;
//!
//! let result = Pipeline::builder()
//!     .cleaning_config(
//!         CleaningConfig::builder()
//!             .missing_value_strategy(MissingValueStrategy::Mean)
//!             .build()?,
//!     )
//!     .capability(Arc::new(GeminiCapability::new(api_key)?))
//!     .build()?
//!     .process(table)?;
//!
//! println!("{} rows removed", result.cleaning_report.rows_removed());
//! for batch in result.analysis.batches() {
//!     println!("batch {}: {}", batch.batch_number, batch.analysis_text);
//! }
//! ```
//!
//! # Using the engine directly
//!
//! ```rust,ignore
//! use autodata::{CleaningEngine, MissingValueStrategy};
//!
//! let engine = CleaningEngine::new();
//! let (table, removed) = engine.remove_duplicate_rows(table)?;
//! let (table, outcomes) = engine.impute_missing(table, MissingValueStrategy::Mode, None)?;
//! ```

pub mod ai;
pub mod analysis;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod imputers;
pub mod pipeline;
pub mod table;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use analysis::{BatchAnalysisOrchestrator, BatchAnalysisOrchestratorBuilder, PromptFormatter};
pub use cleaner::{CleaningEngine, CleaningStage, OutlierHandler};
pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, CleaningConfig, CleaningConfigBuilder, ColumnType,
    ConfigValidationError, MissingValueStrategy, NonNumericFallback, OutlierMethod,
};
pub use error::{AutodataError, Result as AutodataResult, ResultExt};
pub use imputers::StatisticalImputer;
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineStage,
    ProgressReporter, ProgressUpdate,
};
pub use table::{Record, TableHandle, TableStats};
pub use types::{
    AnalysisOutcome, BatchResult, CleaningOutput, CleaningReport, CoercionOutcome, ColumnCoercion,
    ColumnImputation, ColumnRename, ImputationOutcome, OutlierColumnStats, OutlierReport,
    PipelineResult,
};

static_assertions::assert_impl_all!(TableHandle: Send, Sync);
static_assertions::assert_impl_all!(CleaningEngine: Send, Sync);
static_assertions::assert_impl_all!(BatchResult: Send, Sync);
