//! Batched analysis over a table with per-batch failure isolation.

use crate::ai::AnalysisCapability;
use crate::analysis::PromptFormatter;
use crate::config::{AnalysisConfig, ConfigValidationError};
use crate::error::{AutodataError, Result};
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::table::{TableHandle, TableStats};
use crate::types::BatchResult;
use crate::utils::collect_sample_values;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Contiguous row range analyzed as one unit.
#[derive(Debug, Clone, Copy)]
struct BatchJob {
    batch_number: usize,
    offset: usize,
    len: usize,
}

fn plan_batches(row_count: usize, batch_size: usize) -> Vec<BatchJob> {
    (0..row_count)
        .step_by(batch_size)
        .enumerate()
        .map(|(i, offset)| BatchJob {
            batch_number: i + 1,
            offset,
            len: batch_size.min(row_count - offset),
        })
        .collect()
}

fn dispatch_runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?)
}

/// Run the blocking capability call on tokio's blocking pool.
///
/// `permit`, when given, is released only once the call itself returns.
async fn call_capability(
    capability: Arc<dyn AnalysisCapability>,
    prompt: String,
    limit: Option<Duration>,
    permit: Option<OwnedSemaphorePermit>,
) -> Result<String> {
    let name = capability.name().to_string();
    let call = tokio::task::spawn_blocking(move || {
        let raw = capability.run(&prompt);
        drop(permit);
        raw
    });

    let joined = match limit {
        None => call.await,
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(joined) => joined,
            Err(_) => return Err(AutodataError::Timeout(limit)),
        },
    };

    match joined {
        Ok(Ok(text)) if text.trim().is_empty() => Err(AutodataError::EmptyResponse(name)),
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(AutodataError::CapabilityInvocation {
            capability: name,
            reason: format!("{:#}", e),
        }),
        Err(e) => Err(AutodataError::CapabilityInvocation {
            capability: name,
            reason: format!("call ended without a response: {}", e),
        }),
    }
}

/// Runs an [`AnalysisCapability`] over a table in fixed-size row batches.
///
/// A failing batch (service error, empty output, timeout) is recorded as a
/// failed [`BatchResult`] and never stops its siblings. Results are always
/// returned ordered by `batch_number`, whatever order the batches finished in.
///
/// # Example
///
/// ```rust,ignore
/// use autodata::{AnalysisConfig, BatchAnalysisOrchestrator};
/// use autodata::ai::GeminiCapability;
/// use std::sync::Arc;
///
/// let orchestrator = BatchAnalysisOrchestrator::builder(Arc::new(GeminiCapability::new(key)?))
///     .config(AnalysisConfig::builder().batch_size(20).max_concurrency(4).build()?)
///     .build()?;
///
/// for batch in orchestrator.analyze(&table)? {
///     println!("batch {} failed={}", batch.batch_number, batch.failed);
/// }
/// ```
pub struct BatchAnalysisOrchestrator {
    capability: Arc<dyn AnalysisCapability>,
    config: AnalysisConfig,
    batch_timeout: Option<Duration>,
    formatter: PromptFormatter,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

static_assertions::assert_impl_all!(BatchAnalysisOrchestrator: Send, Sync);

impl BatchAnalysisOrchestrator {
    /// Create a builder around the capability to use.
    pub fn builder(capability: Arc<dyn AnalysisCapability>) -> BatchAnalysisOrchestratorBuilder {
        BatchAnalysisOrchestratorBuilder {
            capability,
            config: None,
            batch_timeout: None,
            formatter: None,
            progress_reporter: None,
            cancellation_token: None,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn capability_name(&self) -> &str {
        self.capability.name()
    }

    /// Analyze the table using the configured batch size.
    pub fn analyze(&self, table: &TableHandle) -> Result<Vec<BatchResult>> {
        self.analyze_in_batches(table, self.config.batch_size)
    }

    /// Analyze the table in batches of `batch_size` rows.
    ///
    /// # Errors
    ///
    /// - [`AutodataError::InvalidArgument`] when `batch_size` is zero; no
    ///   batch is dispatched.
    /// - [`AutodataError::Cancelled`] when the cancellation token fires
    ///   before every batch was dispatched.
    ///
    /// Drives its own tokio runtime, so it must not be called from inside
    /// an async context.
    pub fn analyze_in_batches(
        &self,
        table: &TableHandle,
        batch_size: usize,
    ) -> Result<Vec<BatchResult>> {
        if batch_size == 0 {
            return Err(AutodataError::InvalidArgument(
                "batch size must be at least 1".to_string(),
            ));
        }

        let jobs = plan_batches(table.row_count(), batch_size);
        if jobs.is_empty() {
            info!("Table is empty, nothing to analyze");
            return Ok(Vec::new());
        }

        let workers = self.config.max_concurrency.min(jobs.len());
        info!(
            "Analyzing {} rows in {} batches of up to {} rows with {} ({} worker(s))",
            table.row_count(),
            jobs.len(),
            batch_size,
            self.capability.name(),
            workers
        );

        let start = Instant::now();
        let runtime = dispatch_runtime()?;
        let outcome = runtime.block_on(self.dispatch(table, &jobs, workers));
        runtime.shutdown_background();
        let mut results = outcome?;
        results.sort_by_key(|r| r.batch_number);

        let failed = results.iter().filter(|r| r.failed).count();
        info!(
            "Analysis finished in {}ms: {} batches, {} failed",
            start.elapsed().as_millis(),
            results.len(),
            failed
        );
        Ok(results)
    }

    /// Dispatch every job through a semaphore of `workers` permits.
    ///
    /// A permit lives as long as the blocking capability call, not as long
    /// as the batch: a call that timed out keeps its slot until it returns.
    /// Cancellation is checked before each dispatch. Returns only once every
    /// call has finished.
    async fn dispatch(
        &self,
        table: &TableHandle,
        jobs: &[BatchJob],
        workers: usize,
    ) -> Result<Vec<BatchResult>> {
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut in_flight: JoinSet<(BatchJob, Result<String>)> = JoinSet::new();
        let mut results = Vec::with_capacity(jobs.len());
        let mut pending = jobs.iter();
        let mut cancelled = false;

        loop {
            while !cancelled && in_flight.len() < workers {
                if self.cancellation_token.is_cancelled() {
                    debug!("Cancellation requested, no further batches dispatched");
                    cancelled = true;
                    break;
                }
                let Some(job) = pending.next().copied() else {
                    break;
                };

                let prompt = match table
                    .slice(job.offset, job.len)
                    .to_records()
                    .and_then(|rows| self.formatter.batch_prompt(job.offset, &rows))
                {
                    Ok(prompt) => prompt,
                    Err(e) => {
                        let result = self.finish_batch(job, Err(e));
                        self.report_batch(&result, results.len() + 1, jobs.len());
                        results.push(result);
                        continue;
                    }
                };

                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| self.invocation_error(e.to_string()))?;
                let capability = Arc::clone(&self.capability);
                let limit = self.batch_timeout;
                in_flight.spawn(async move {
                    (job, call_capability(capability, prompt, limit, Some(permit)).await)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (job, outcome) =
                joined.map_err(|e| self.invocation_error(format!("batch task failed: {}", e)))?;
            let result = self.finish_batch(job, outcome);
            self.report_batch(&result, results.len() + 1, jobs.len());
            results.push(result);
        }

        // Abandoned calls still hold their permits.
        let _drained = semaphore
            .acquire_many(workers as u32)
            .await
            .map_err(|e| self.invocation_error(e.to_string()))?;

        if cancelled && results.len() < jobs.len() {
            return Err(AutodataError::Cancelled);
        }
        Ok(results)
    }

    fn finish_batch(&self, job: BatchJob, outcome: Result<String>) -> BatchResult {
        match outcome {
            Ok(text) => {
                debug!(
                    "Batch {} ({} rows) analyzed, {} chars",
                    job.batch_number,
                    job.len,
                    text.len()
                );
                BatchResult::succeeded(job.batch_number, job.len, text)
            }
            Err(e) => {
                warn!("Batch {} failed: {}", job.batch_number, e);
                BatchResult::failed(job.batch_number, job.len, e.to_string())
            }
        }
    }

    /// Run one prompt outside batching, applying the batch timeout.
    ///
    /// On timeout the blocking call is left to finish in the background and
    /// its result is discarded.
    fn invoke(&self, prompt: &str) -> Result<String> {
        let runtime = dispatch_runtime()?;
        let outcome = runtime.block_on(call_capability(
            Arc::clone(&self.capability),
            prompt.to_owned(),
            self.batch_timeout,
            None,
        ));
        runtime.shutdown_background();
        outcome
    }

    fn invocation_error(&self, reason: impl Into<String>) -> AutodataError {
        AutodataError::CapabilityInvocation {
            capability: self.capability.name().to_string(),
            reason: reason.into(),
        }
    }

    /// Send free text straight to the capability.
    ///
    /// Never fails: an error comes back as a descriptive string.
    pub fn analyze_single(&self, text: &str) -> String {
        match self.invoke(text) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Single analysis failed: {}", e);
                format!("Error analyzing text: {}", e)
            }
        }
    }

    /// Ask for cleaning recommendations for one column, based on its first
    /// non-null values.
    pub fn analyze_column(&self, table: &TableHandle, column: &str) -> Result<String> {
        let series = table.series(column)?;
        let samples = collect_sample_values(series, self.formatter.column_sample());
        debug!("Column '{}': {} sample values", column, samples.len());
        self.invoke(&self.formatter.column_prompt(column, &samples))
    }

    /// Produce a narrative data quality report for the whole table.
    pub fn generate_report(&self, table: &TableHandle) -> Result<String> {
        let stats = TableStats::from_table(table, self.formatter.report_sample_rows())?;
        info!(
            "Generating quality report: {} rows, {} missing cells, {} duplicate rows",
            stats.total_rows, stats.missing_cells, stats.duplicate_rows
        );
        self.invoke(&self.formatter.report_prompt(&stats)?)
    }

    fn report_batch(&self, result: &BatchResult, done: usize, total: usize) {
        if let Some(reporter) = &self.progress_reporter {
            let status = if result.failed { "failed" } else { "analyzed" };
            reporter.report(ProgressUpdate::with_items(
                PipelineStage::Analyzing,
                format!("Batch {}/{}", result.batch_number, total),
                done,
                total,
                format!("Batch {} {}", result.batch_number, status),
            ));
        }
    }
}

/// Builder for [`BatchAnalysisOrchestrator`].
pub struct BatchAnalysisOrchestratorBuilder {
    capability: Arc<dyn AnalysisCapability>,
    config: Option<AnalysisConfig>,
    batch_timeout: Option<Duration>,
    formatter: Option<PromptFormatter>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

impl BatchAnalysisOrchestratorBuilder {
    /// Set batch size, concurrency and timeout.
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Per-batch timeout with sub-second precision. Overrides
    /// `batch_timeout_secs` from the config.
    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    pub fn formatter(mut self, formatter: PromptFormatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Receive one update per finished batch.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Closure shorthand for [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the orchestrator.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<BatchAnalysisOrchestrator, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let batch_timeout = self
            .batch_timeout
            .or(config.batch_timeout_secs.map(Duration::from_secs));

        Ok(BatchAnalysisOrchestrator {
            capability: self.capability,
            config,
            batch_timeout,
            formatter: self.formatter.unwrap_or_default(),
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockCapability;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps on every call and tracks how many calls overlap.
    struct SlowCapability {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowCapability {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl AnalysisCapability for SlowCapability {
        fn run(&self, _prompt: &str) -> anyhow::Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("done".to_string())
        }

        fn name(&self) -> &str {
            "Slow"
        }
    }

    fn table(rows: i64) -> TableHandle {
        let ids: Vec<i64> = (0..rows).collect();
        TableHandle::new(df!("id" => ids).unwrap())
    }

    fn orchestrator(mock: MockCapability, batch_size: usize) -> BatchAnalysisOrchestrator {
        BatchAnalysisOrchestrator::builder(Arc::new(mock))
            .config(AnalysisConfig::builder().batch_size(batch_size).build().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_plan_batches() {
        let jobs = plan_batches(45, 20);
        let lens: Vec<usize> = jobs.iter().map(|j| j.len).collect();
        let offsets: Vec<usize> = jobs.iter().map(|j| j.offset).collect();
        assert_eq!(lens, vec![20, 20, 5]);
        assert_eq!(offsets, vec![0, 20, 40]);
        assert!(plan_batches(0, 20).is_empty());
        assert_eq!(plan_batches(40, 20).len(), 2);
    }

    #[test]
    fn test_analyze_sequential() {
        let results = orchestrator(MockCapability::new().with_response("ok"), 4)
            .analyze(&table(10))
            .unwrap();

        let numbers: Vec<usize> = results.iter().map(|r| r.batch_number).collect();
        let rows: Vec<usize> = results.iter().map(|r| r.rows_processed).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(rows, vec![4, 4, 2]);
        assert!(results.iter().all(|r| !r.failed && r.analysis_text == "ok"));
    }

    #[test]
    fn test_zero_batch_size_dispatches_nothing() {
        let mock = Arc::new(MockCapability::new());
        let orchestrator = BatchAnalysisOrchestrator::builder(mock.clone())
            .build()
            .unwrap();

        let err = orchestrator.analyze_in_batches(&table(5), 0).unwrap_err();
        assert!(matches!(err, AutodataError::InvalidArgument(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_empty_table_yields_no_batches() {
        let results = orchestrator(MockCapability::new(), 3)
            .analyze(&TableHandle::default())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_blank_output_is_failure() {
        let results = orchestrator(MockCapability::new().with_response("   \n"), 5)
            .analyze(&table(5))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].failed);
        assert!(results[0].analysis_text.contains("empty response"));
    }

    #[test]
    fn test_prompts_carry_table_row_positions() {
        let mock = Arc::new(MockCapability::new());
        BatchAnalysisOrchestrator::builder(mock.clone())
            .config(AnalysisConfig::builder().batch_size(2).build().unwrap())
            .build()
            .unwrap()
            .analyze(&table(3))
            .unwrap();

        let prompts = mock.prompts();
        assert!(prompts[0].contains("Row 0: {\"id\":0}"));
        assert!(prompts[0].contains("Row 1: {\"id\":1}"));
        assert!(prompts[1].contains("Row 2: {\"id\":2}"));
    }

    #[test]
    fn test_progress_per_batch() {
        let updates = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = updates.clone();
        BatchAnalysisOrchestrator::builder(Arc::new(MockCapability::new()))
            .config(AnalysisConfig::builder().batch_size(5).build().unwrap())
            .on_progress(move |u| sink.lock().unwrap().push(u))
            .build()
            .unwrap()
            .analyze(&table(12))
            .unwrap();

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|u| u.stage == PipelineStage::Analyzing));
        assert_eq!(updates[2].items_processed, Some(3));
        assert_eq!(updates[2].items_total, Some(3));
    }

    #[test]
    fn test_cancelled_before_dispatch() {
        let mock = Arc::new(MockCapability::new());
        let token = CancellationToken::new();
        token.cancel();

        let err = BatchAnalysisOrchestrator::builder(mock.clone())
            .cancellation_token(token)
            .build()
            .unwrap()
            .analyze(&table(10))
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_analyze_single_degrades_to_message() {
        let ok = orchestrator(MockCapability::new().with_response("fine"), 1);
        assert_eq!(ok.analyze_single("hello"), "fine");

        let failing = orchestrator(MockCapability::new().fail_on_call(1), 1);
        let text = failing.analyze_single("hello");
        assert!(text.starts_with("Error analyzing text:"));
        assert!(text.contains("Injected failure"));
    }

    #[test]
    fn test_analyze_column() {
        let mock = Arc::new(MockCapability::new().with_response("strip whitespace"));
        let orchestrator = BatchAnalysisOrchestrator::builder(mock.clone())
            .build()
            .unwrap();
        let names: Vec<Option<&str>> = (0..15)
            .map(|i| if i == 0 { None } else { Some("x") })
            .collect();
        let table = TableHandle::new(df!("name" => names).unwrap());

        assert_eq!(
            orchestrator.analyze_column(&table, "name").unwrap(),
            "strip whitespace"
        );
        let prompt = &mock.prompts()[0];
        assert!(prompt.contains("Column: name"));
        assert_eq!(prompt.matches("\"x\"").count(), 10);

        let err = orchestrator.analyze_column(&table, "missing").unwrap_err();
        assert!(matches!(err, AutodataError::ColumnNotFound(_)));
    }

    #[test]
    fn test_generate_report() {
        let mock = Arc::new(MockCapability::new().with_response("Score: 8"));
        let orchestrator = BatchAnalysisOrchestrator::builder(mock.clone())
            .build()
            .unwrap();
        let table = TableHandle::new(
            df!("id" => [1i64, 1, 2], "city" => [Some("Oslo"), Some("Oslo"), None]).unwrap(),
        );

        assert_eq!(orchestrator.generate_report(&table).unwrap(), "Score: 8");
        let prompt = &mock.prompts()[0];
        assert!(prompt.contains("- Total rows: 3"));
        assert!(prompt.contains("- Missing values: 1"));
        assert!(prompt.contains("- Duplicate rows: 1"));
    }

    #[test]
    fn test_timed_out_calls_keep_their_slot() {
        let slow = Arc::new(SlowCapability::new(Duration::from_millis(100)));
        let results = BatchAnalysisOrchestrator::builder(slow.clone())
            .config(AnalysisConfig::builder().batch_size(1).build().unwrap())
            .batch_timeout(Duration::from_millis(20))
            .build()
            .unwrap()
            .analyze(&table(5))
            .unwrap();

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.failed && r.analysis_text.contains("timed out")));
        assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
        assert_eq!(slow.in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = AnalysisConfig {
            max_concurrency: 0,
            ..AnalysisConfig::default()
        };
        let result = BatchAnalysisOrchestrator::builder(Arc::new(MockCapability::new()))
            .config(config)
            .build();
        assert!(result.is_err());
    }
}
