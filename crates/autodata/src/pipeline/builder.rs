//! Main pipeline module.
//!
//! This module provides the `Pipeline` struct and builder that run the
//! cleaning engine and, when a capability is configured, batch analysis of
//! the cleaned table.

use crate::ai::AnalysisCapability;
use crate::analysis::BatchAnalysisOrchestrator;
use crate::cleaner::CleaningEngine;
use crate::config::{AnalysisConfig, CleaningConfig, ConfigValidationError};
use crate::error::{AutodataError, Result};
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::table::TableHandle;
use crate::types::{AnalysisOutcome, PipelineResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Reason recorded when no capability was configured.
const NO_CAPABILITY: &str = "AI agent not available: no analysis capability configured";

/// Clean-then-analyze pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use autodata::{Pipeline, CleaningConfig, MissingValueStrategy, TableHandle};
/// use autodata::ai::GeminiCapability;
/// use std::sync::Arc;
///
/// let capability = Arc::new(GeminiCapability::new(api_key)?);
///
/// let result = Pipeline::builder()
///     .cleaning_config(
///         CleaningConfig::builder()
///             .missing_value_strategy(MissingValueStrategy::Median)
///             .build()?,
///     )
///     .capability(capability)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .process(TableHandle::from_csv_path("data.csv")?)?;
///
/// // Without a capability the analysis is reported as unavailable
/// let result = Pipeline::builder().build()?.process(table)?;
/// ```
pub struct Pipeline {
    cleaning_config: CleaningConfig,
    analysis_config: AnalysisConfig,
    capability: Option<Arc<dyn AnalysisCapability>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
    engine: CleaningEngine,
}

static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn cleaning_config(&self) -> &CleaningConfig {
        &self.cleaning_config
    }

    pub fn analysis_config(&self) -> &AnalysisConfig {
        &self.analysis_config
    }

    /// Clean the table, then analyze the cleaned table.
    ///
    /// Analysis never changes the cleaned table, and individual batch
    /// failures are reported inside [`AnalysisOutcome`] rather than as errors.
    ///
    /// # Errors
    ///
    /// Returns `Err(AutodataError::Cancelled)` if the pipeline was cancelled
    /// via the cancellation token.
    pub fn process(&self, table: TableHandle) -> Result<PipelineResult> {
        match self.process_internal(table) {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Pipeline completed: {} rows x {} columns",
                    result.cleaned_shape.0, result.cleaned_shape.1
                )));
                Ok(result)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(AutodataError::Cancelled);
        }
        Ok(())
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn process_internal(&self, table: TableHandle) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let original_shape = table.shape();

        info!(
            "Starting pipeline on {} rows x {} columns",
            original_shape.0, original_shape.1
        );
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            0.0,
            "Starting pipeline...",
        ));
        self.check_cancelled()?;

        let output = self.engine.clean_observed(
            table,
            &self.cleaning_config,
            &mut |stage| {
                self.check_cancelled()?;
                let stage = PipelineStage::from(stage);
                self.report_progress(ProgressUpdate::new(
                    stage,
                    0.0,
                    format!("{}...", stage.display_name()),
                ));
                Ok(())
            },
        )?;
        let cleaned_shape = output.table.shape();
        info!(
            "Cleaning done: {} rows removed, {} cells filled",
            output.report.rows_removed(),
            output.report.cells_filled()
        );

        self.check_cancelled()?;

        let analysis = match &self.capability {
            Some(capability) => {
                self.report_progress(ProgressUpdate::new(
                    PipelineStage::Analyzing,
                    0.0,
                    format!("Analyzing with {}...", capability.name()),
                ));
                let mut builder = BatchAnalysisOrchestrator::builder(Arc::clone(capability))
                    .config(self.analysis_config.clone())
                    .cancellation_token(self.cancellation_token.clone());
                if let Some(reporter) = &self.progress_reporter {
                    builder = builder.progress_reporter(Arc::clone(reporter));
                }
                let batches = builder.build()?.analyze(&output.table)?;
                AnalysisOutcome::Completed { batches }
            }
            None => {
                warn!("Skipping analysis: no capability configured");
                AnalysisOutcome::Unavailable {
                    reason: NO_CAPABILITY.to_string(),
                }
            }
        };

        Ok(PipelineResult {
            cleaned: output.table,
            cleaning_report: output.report,
            analysis,
            original_shape,
            cleaned_shape,
            duration_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    cleaning_config: Option<CleaningConfig>,
    analysis_config: Option<AnalysisConfig>,
    capability: Option<Arc<dyn AnalysisCapability>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the cleaning configuration.
    pub fn cleaning_config(mut self, config: CleaningConfig) -> Self {
        self.cleaning_config = Some(config);
        self
    }

    /// Set batch size, concurrency and timeout for analysis.
    pub fn analysis_config(mut self, config: AnalysisConfig) -> Self {
        self.analysis_config = Some(config);
        self
    }

    /// Set the capability used for analysis.
    ///
    /// Use `Arc` to share one capability (and its HTTP client) across
    /// pipeline runs. Without a capability the pipeline only cleans.
    pub fn capability(mut self, capability: Arc<dyn AnalysisCapability>) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let pipeline = Pipeline::builder()
    ///     .on_progress(|update| {
    ///         println!("[{:.0}%] {:?}: {}",
    ///             update.progress * 100.0,
    ///             update.stage,
    ///             update.message
    ///         );
    ///     })
    ///     .build()?;
    /// ```
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token for stopping the pipeline.
    ///
    /// The token is checked before each cleaning stage and before each
    /// analysis batch is dispatched.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if either configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let cleaning_config = self.cleaning_config.unwrap_or_default();
        cleaning_config.validate()?;
        let analysis_config = self.analysis_config.unwrap_or_default();
        analysis_config.validate()?;

        Ok(Pipeline {
            engine: CleaningEngine::with_non_numeric_fallback(
                cleaning_config.non_numeric_fallback,
            ),
            cleaning_config,
            analysis_config,
            capability: self.capability,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}
