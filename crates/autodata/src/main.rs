//! CLI entry point for autodata.

use anyhow::{Result, anyhow};
use autodata::ai::{AnalysisCapability, MockCapability};
use autodata::{
    AnalysisConfig, BatchAnalysisOrchestrator, CleaningConfig, ColumnType, MissingValueStrategy,
    NonNumericFallback, OutlierMethod, Pipeline, PipelineResult, TableHandle,
};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[cfg(feature = "ai")]
use autodata::ai::{GeminiCapability, GeminiConfig, OpenRouterCapability, OpenRouterConfig};
#[cfg(feature = "ai")]
use std::env;

/// CLI-compatible missing value strategy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStrategy {
    /// Fill numeric nulls with the column mean
    Mean,
    /// Fill numeric nulls with the column median
    Median,
    /// Fill nulls with the most frequent value
    Mode,
    /// Drop rows that have a null in the column
    Drop,
    /// Carry the previous value forward
    ForwardFill,
    /// Carry the next value backward
    BackwardFill,
}

impl From<CliStrategy> for MissingValueStrategy {
    fn from(cli: CliStrategy) -> Self {
        match cli {
            CliStrategy::Mean => MissingValueStrategy::Mean,
            CliStrategy::Median => MissingValueStrategy::Median,
            CliStrategy::Mode => MissingValueStrategy::Mode,
            CliStrategy::Drop => MissingValueStrategy::Drop,
            CliStrategy::ForwardFill => MissingValueStrategy::ForwardFill,
            CliStrategy::BackwardFill => MissingValueStrategy::BackwardFill,
        }
    }
}

/// What mean/median do with non-numeric columns
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFallback {
    /// Forward-fill the column instead
    ForwardFill,
    /// Leave the column untouched
    Skip,
}

impl From<CliFallback> for NonNumericFallback {
    fn from(cli: CliFallback) -> Self {
        match cli {
            CliFallback::ForwardFill => NonNumericFallback::ForwardFill,
            CliFallback::Skip => NonNumericFallback::Skip,
        }
    }
}

/// CLI-compatible outlier method enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOutlierMethod {
    /// Drop rows outside [Q1 - t*IQR, Q3 + t*IQR]
    Iqr,
    /// Drop rows with |z| >= t
    Zscore,
    /// Keep every row
    None,
}

impl From<CliOutlierMethod> for OutlierMethod {
    fn from(cli: CliOutlierMethod) -> Self {
        match cli {
            CliOutlierMethod::Iqr => OutlierMethod::Iqr,
            CliOutlierMethod::Zscore => OutlierMethod::Zscore,
            CliOutlierMethod::None => OutlierMethod::None,
        }
    }
}

/// Analysis backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliProvider {
    /// Google Gemini (GEMINI_API_KEY)
    Gemini,
    /// OpenRouter (OPENROUTER_API_KEY)
    Openrouter,
    /// Canned responses, no network
    Mock,
    /// Clean only
    None,
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Rule-based data cleaning with batched AI analysis",
    long_about = "Cleans a CSV or JSON table (duplicates, column names, missing values, \
                  optional type coercion and outlier removal), then analyzes the cleaned \
                  rows in batches with an AI model.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  GEMINI_API_KEY        API key for --provider gemini\n  \
                  OPENROUTER_API_KEY    API key for --provider openrouter\n\n\
                  EXAMPLES:\n  \
                  # Clean and analyze with Gemini\n  \
                  autodata -i data.csv\n\n  \
                  # Median imputation, IQR outliers on two columns, write result\n  \
                  autodata -i data.csv --strategy median --outlier-method iqr \\\n    \
                  --outlier-column salary --outlier-column age -o cleaned.csv\n\n  \
                  # Coerce types and print JSON only\n  \
                  autodata -i data.json --coerce id=integer --coerce joined=timestamp --json"
)]
struct Args {
    /// Path to the input table (.csv or .json array of objects)
    #[arg(short, long)]
    input: String,

    /// Cleaning config as JSON; flags below override its fields
    #[arg(long)]
    config: Option<String>,

    /// Missing value strategy [default: forward-fill]
    #[arg(long, value_enum)]
    strategy: Option<CliStrategy>,

    /// Behavior of mean/median on non-numeric columns [default: forward-fill]
    #[arg(long, value_enum)]
    non_numeric_fallback: Option<CliFallback>,

    /// Outlier method [default: none]
    #[arg(long, value_enum)]
    outlier_method: Option<CliOutlierMethod>,

    /// IQR multiplier or z-score cutoff [default: 1.5]
    #[arg(long)]
    outlier_threshold: Option<f64>,

    /// Column checked for outliers (normalized name, repeatable)
    #[arg(long = "outlier-column")]
    outlier_columns: Vec<String>,

    /// Coerce a column, e.g. `age=integer` (repeatable)
    #[arg(long, value_parser = parse_coercion)]
    coerce: Vec<(String, ColumnType)>,

    /// Rows per analysis batch
    #[arg(long, default_value = "20")]
    batch_size: usize,

    /// Batches analyzed in parallel
    #[arg(long, default_value = "1")]
    concurrency: usize,

    /// Per-batch timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Analysis backend
    #[arg(long, value_enum, default_value = "gemini")]
    provider: CliProvider,

    /// Override the provider's default model
    #[arg(long)]
    model: Option<String>,

    /// Also ask for a whole-table data quality report
    #[arg(long)]
    quality_report: bool,

    /// Write the cleaned table to this CSV file
    #[arg(short, long)]
    output: Option<String>,

    /// Output JSON to stdout instead of a human-readable summary
    ///
    /// Disables all logs; only the final JSON document is printed.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and the final result)
    #[arg(short, long)]
    quiet: bool,
}

fn parse_coercion(raw: &str) -> std::result::Result<(String, ColumnType), String> {
    let (column, ty) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=TYPE, got '{}'", raw))?;
    let ty: ColumnType = ty.parse().map_err(|e: autodata::AutodataError| e.to_string())?;
    Ok((column.trim().to_string(), ty))
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only carries JSON.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    dotenv().ok();

    if !Path::new(&args.input).exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    info!("Loading table from: {}", args.input);
    let table = load_table(&args.input)?;
    info!("Table loaded: {} rows x {} columns", table.row_count(), table.column_count());

    let cleaning_config = build_cleaning_config(&args)?;
    let analysis_config = AnalysisConfig {
        batch_size: args.batch_size,
        max_concurrency: args.concurrency,
        batch_timeout_secs: args.timeout_secs,
    };
    analysis_config.validate()?;

    let capability = build_capability(&args)?;

    let mut builder = Pipeline::builder()
        .cleaning_config(cleaning_config)
        .analysis_config(analysis_config.clone());
    if let Some(capability) = &capability {
        builder = builder.capability(Arc::clone(capability));
    }
    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }

    let result = builder.build()?.process(table).map_err(|e| {
        error!("Pipeline failed: {}", e);
        anyhow!("Pipeline failed: {}", e)
    })?;

    let quality_report = match (&capability, args.quality_report) {
        (Some(capability), true) => {
            let orchestrator = BatchAnalysisOrchestrator::builder(Arc::clone(capability))
                .config(analysis_config)
                .build()?;
            match orchestrator.generate_report(&result.cleaned) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Quality report failed: {}", e);
                    None
                }
            }
        }
        (None, true) => {
            warn!("--quality-report needs an analysis provider");
            None
        }
        _ => None,
    };

    if let Some(ref output) = args.output {
        result.cleaned.write_csv(output)?;
        info!("Cleaned table written to: {}", output);
    }

    if args.json {
        print_json(&result, quality_report.as_deref())?;
    } else {
        print_human_readable_summary(&result, quality_report.as_deref(), &args);
    }
    Ok(())
}

/// Read a table, choosing the format from the file extension.
fn load_table(path: &str) -> Result<TableHandle> {
    let is_json = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let table = if is_json {
        TableHandle::from_json_str(&std::fs::read_to_string(path)?)?
    } else {
        TableHandle::from_csv_path(path)?
    };
    Ok(table)
}

/// Start from `--config` (or defaults) and apply the flags that were given.
fn build_cleaning_config(args: &Args) -> Result<CleaningConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow!("Failed to read config {}: {}", path, e))?;
            serde_json::from_str::<CleaningConfig>(&text)
                .map_err(|e| anyhow!("Invalid config {}: {}", path, e))?
        }
        None => CleaningConfig::default(),
    };

    if let Some(strategy) = args.strategy {
        config.missing_value_strategy = strategy.into();
    }
    if let Some(fallback) = args.non_numeric_fallback {
        config.non_numeric_fallback = fallback.into();
    }
    if let Some(method) = args.outlier_method {
        config.outlier_method = method.into();
    }
    if let Some(threshold) = args.outlier_threshold {
        config.outlier_threshold = threshold;
    }
    if !args.outlier_columns.is_empty() {
        config.outlier_columns = args.outlier_columns.clone();
    }
    for (column, ty) in &args.coerce {
        config.target_column_types.insert(column.clone(), *ty);
    }

    if config.outlier_method != OutlierMethod::None && config.outlier_columns.is_empty() {
        warn!(
            "Outlier method '{}' set without --outlier-column; outlier removal is skipped",
            config.outlier_method
        );
    }

    config.validate()?;
    Ok(config)
}

/// Resolve the analysis backend. A missing API key disables analysis
/// instead of failing the run.
#[cfg(feature = "ai")]
fn build_capability(args: &Args) -> Result<Option<Arc<dyn AnalysisCapability>>> {
    let capability: Arc<dyn AnalysisCapability> = match args.provider {
        CliProvider::None => {
            info!("Analysis disabled (--provider none)");
            return Ok(None);
        }
        CliProvider::Mock => Arc::new(MockCapability::new()),
        CliProvider::Gemini => {
            let Ok(api_key) = env::var("GEMINI_API_KEY") else {
                warn!("GEMINI_API_KEY not set. Running without analysis.");
                return Ok(None);
            };
            let mut config = GeminiConfig::builder();
            if let Some(model) = &args.model {
                config = config.model(model);
            }
            Arc::new(GeminiCapability::with_config(api_key, config.build())?)
        }
        CliProvider::Openrouter => {
            let Ok(api_key) = env::var("OPENROUTER_API_KEY") else {
                warn!("OPENROUTER_API_KEY not set. Running without analysis.");
                return Ok(None);
            };
            let mut config = OpenRouterConfig::builder();
            if let Some(model) = &args.model {
                config = config.model(model);
            }
            Arc::new(OpenRouterCapability::with_config(api_key, config.build())?)
        }
    };

    info!(
        "Analysis with {} ({})",
        capability.name(),
        capability.model().unwrap_or("default model")
    );
    Ok(Some(capability))
}

/// Without the "ai" feature only the mock backend exists.
#[cfg(not(feature = "ai"))]
fn build_capability(args: &Args) -> Result<Option<Arc<dyn AnalysisCapability>>> {
    match args.provider {
        CliProvider::Mock => Ok(Some(Arc::new(MockCapability::new()))),
        CliProvider::None => Ok(None),
        _ => {
            warn!("AI support not compiled in. Running without analysis.");
            warn!("Compile with --features ai to enable AI support.");
            Ok(None)
        }
    }
}

fn print_json(result: &PipelineResult, quality_report: Option<&str>) -> Result<()> {
    let document = serde_json::json!({
        "original_shape": result.original_shape,
        "cleaned_shape": result.cleaned_shape,
        "duration_ms": result.duration_ms,
        "cleaning_report": result.cleaning_report,
        "analysis": result.analysis,
        "quality_report": quality_report,
        "records": result.cleaned.to_records()?,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

/// Print a human-readable summary of the run.
///
/// Uses `println!` on purpose: this is the command's output, not a log.
fn print_human_readable_summary(
    result: &PipelineResult,
    quality_report: Option<&str>,
    args: &Args,
) {
    let report = &result.cleaning_report;

    println!();
    println!("{}", "=".repeat(80));
    println!("CLEANING COMPLETE");
    println!("{}", "=".repeat(80));
    println!();
    println!(
        "Input:  {} ({} rows x {} columns)",
        args.input, result.original_shape.0, result.original_shape.1
    );
    match &args.output {
        Some(output) => println!(
            "Output: {} ({} rows x {} columns)",
            output, result.cleaned_shape.0, result.cleaned_shape.1
        ),
        None => println!(
            "Output: {} rows x {} columns (not written, use --output)",
            result.cleaned_shape.0, result.cleaned_shape.1
        ),
    }
    println!();

    println!("Cleaning Summary:");
    println!("  Duration: {}ms", result.duration_ms);
    println!(
        "  Rows: {} -> {} ({} removed, {} duplicates)",
        report.rows_before,
        report.rows_after,
        report.rows_removed(),
        report.duplicates_removed
    );
    println!("  Cells filled: {}", report.cells_filled());
    let failed_coercions = report.coercions.iter().filter(|c| c.is_failed()).count();
    if failed_coercions > 0 {
        println!("  Failed coercions: {}", failed_coercions);
    }
    if let Some(outliers) = &report.outliers {
        println!(
            "  Outliers: {} rows removed ({}, threshold {})",
            outliers.rows_removed, outliers.method, outliers.threshold
        );
    }
    println!();

    if !report.steps.is_empty() {
        println!("Actions Taken:");
        for step in report.steps.iter().take(10) {
            println!("  - {}", step);
        }
        if report.steps.len() > 10 {
            println!("  ... and {} more actions", report.steps.len() - 10);
        }
        println!();
    }

    match &result.analysis {
        autodata::AnalysisOutcome::Unavailable { reason } => {
            println!("Analysis: {}", reason);
        }
        autodata::AnalysisOutcome::Completed { batches } => {
            println!(
                "Analysis: {} batches, {} failed",
                batches.len(),
                result.analysis.failed_batches()
            );
            for batch in batches {
                let status = if batch.failed { "FAILED" } else { "ok" };
                println!(
                    "\n--- Batch {} ({} rows, {}) ---",
                    batch.batch_number, batch.rows_processed, status
                );
                println!("{}", batch.analysis_text.trim());
            }
        }
    }

    if let Some(text) = quality_report {
        println!();
        println!("Data Quality Report:");
        println!("{}", text.trim());
    }

    println!();
    println!("Use --json for machine-readable output");
    println!("{}", "=".repeat(80));
}
