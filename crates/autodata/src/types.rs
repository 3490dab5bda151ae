use crate::config::{ColumnType, MissingValueStrategy, OutlierMethod};
use crate::table::TableHandle;
use serde::{Deserialize, Serialize};

// ============================================================================
// Analysis Types
// ============================================================================

/// Outcome of analyzing one contiguous batch of rows.
///
/// Produced once per batch by the orchestrator and never mutated afterwards.
/// A failed batch carries the error description in `analysis_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// 1-based position of the batch in traversal order.
    pub batch_number: usize,
    /// Number of rows in the batch.
    pub rows_processed: usize,
    /// Capability output, or the error description when `failed`.
    pub analysis_text: String,
    pub failed: bool,
}

impl BatchResult {
    pub fn succeeded(batch_number: usize, rows_processed: usize, text: impl Into<String>) -> Self {
        Self {
            batch_number,
            rows_processed,
            analysis_text: text.into(),
            failed: false,
        }
    }

    pub fn failed(batch_number: usize, rows_processed: usize, error: impl Into<String>) -> Self {
        Self {
            batch_number,
            rows_processed,
            analysis_text: error.into(),
            failed: true,
        }
    }
}

/// Analysis half of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Every batch was dispatched; individual batches may still have failed.
    Completed { batches: Vec<BatchResult> },
    /// No capability was configured, so analysis never ran.
    Unavailable { reason: String },
}

impl AnalysisOutcome {
    /// Batch results, empty when analysis was unavailable.
    pub fn batches(&self) -> &[BatchResult] {
        match self {
            Self::Completed { batches } => batches,
            Self::Unavailable { .. } => &[],
        }
    }

    pub fn failed_batches(&self) -> usize {
        self.batches().iter().filter(|b| b.failed).count()
    }
}

// ============================================================================
// Cleaning Outcome Types
// ============================================================================

/// What happened to one column name during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub original: String,
    pub normalized: String,
    /// True when the base normalized name was already taken and a suffix
    /// had to be appended.
    pub collided: bool,
}

impl ColumnRename {
    pub fn changed(&self) -> bool {
        self.original != self.normalized
    }
}

/// Per-column result of the imputation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImputationOutcome {
    /// Nulls were filled. `remaining_nulls` is non-zero when a leading
    /// (forward fill) or trailing (backward fill) null had no neighbor.
    Filled {
        strategy_applied: MissingValueStrategy,
        filled: usize,
        remaining_nulls: usize,
    },
    /// Rows with a null in this column were removed.
    RowsDropped { rows: usize },
    /// The strategy does not apply to this column; left untouched.
    SkippedUnsupported { reason: String },
    /// The column had no nulls.
    SkippedAlreadyClean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnImputation {
    pub column: String,
    pub outcome: ImputationOutcome,
}

/// Per-column result of the coercion step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoercionOutcome {
    Converted {
        from: String,
        /// Values that could not be parsed and became null (timestamps only).
        nulls_introduced: usize,
    },
    AlreadyTyped,
    /// The column was left unchanged.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCoercion {
    pub column: String,
    pub target: ColumnType,
    pub outcome: CoercionOutcome,
}

impl ColumnCoercion {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CoercionOutcome::Failed { .. })
    }
}

/// Bounds computed for one column by the outlier step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierColumnStats {
    pub column: String,
    /// Lower edge of the kept range. IQR keeps values on the bound, z-score
    /// drops them. `None` when the column had no usable values (or a zero
    /// standard deviation under z-score).
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    /// Rows flagged by this column alone.
    pub flagged: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierReport {
    pub method: OutlierMethod,
    pub threshold: f64,
    pub rows_before: usize,
    pub rows_removed: usize,
    pub columns: Vec<OutlierColumnStats>,
    /// Requested columns that were not numeric.
    pub skipped_columns: Vec<String>,
}

impl OutlierReport {
    pub fn noop(method: OutlierMethod, threshold: f64, rows: usize) -> Self {
        Self {
            method,
            threshold,
            rows_before: rows,
            rows_removed: 0,
            columns: Vec::new(),
            skipped_columns: Vec::new(),
        }
    }
}

/// Everything `clean` did, in order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    /// Exact duplicates removed before and after imputation.
    pub duplicates_removed: usize,
    pub renames: Vec<ColumnRename>,
    pub imputations: Vec<ColumnImputation>,
    pub coercions: Vec<ColumnCoercion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outliers: Option<OutlierReport>,
    /// Human-readable log of the steps, one entry per action.
    pub steps: Vec<String>,
}

impl CleaningReport {
    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }

    pub fn cells_filled(&self) -> usize {
        self.imputations
            .iter()
            .map(|i| match i.outcome {
                ImputationOutcome::Filled { filled, .. } => filled,
                _ => 0,
            })
            .sum()
    }

    pub fn add_step(&mut self, step: impl Into<String>) {
        self.steps.push(step.into());
    }
}

/// Cleaned table together with the report of how it was produced.
#[derive(Debug, Clone)]
pub struct CleaningOutput {
    pub table: TableHandle,
    pub report: CleaningReport,
}

// ============================================================================
// Pipeline Types
// ============================================================================

/// Result of a full clean-then-analyze run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub cleaned: TableHandle,
    pub cleaning_report: CleaningReport,
    pub analysis: AnalysisOutcome,
    /// `(rows, columns)` of the input table.
    pub original_shape: (usize, usize),
    pub cleaned_shape: (usize, usize),
    pub duration_ms: u64,
}
