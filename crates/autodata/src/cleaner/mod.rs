//! Rule-based cleaning engine.
//!
//! This module provides functionality for:
//! - Removing exact duplicate rows (first occurrence kept, order preserved)
//! - Normalizing column names with a deterministic collision policy
//! - Imputing missing values column by column
//! - Coercing columns to requested types
//! - Removing outlier rows with IQR or z-score filtering
//!
//! Every operation consumes a [`TableHandle`] and returns a new one together
//! with a typed record of what it did.

mod converters;
mod names;
mod outliers;

pub use outliers::OutlierHandler;

use crate::config::{
    CleaningConfig, ColumnType, MissingValueStrategy, NonNumericFallback, OutlierMethod,
};
use crate::error::{AutodataError, Result};
use crate::imputers::StatisticalImputer;
use crate::table::TableHandle;
use crate::types::{
    CleaningOutput, CleaningReport, CoercionOutcome, ColumnCoercion, ColumnImputation,
    ColumnRename, ImputationOutcome, OutlierReport,
};
use crate::utils::{dtype_name, is_numeric_dtype, nan_to_null};
use polars::prelude::*;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Steps of [`CleaningEngine::clean`], reported before each one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningStage {
    Deduplicating,
    NormalizingNames,
    Imputing,
    CoercingTypes,
    RemovingOutliers,
}

/// How one column should be imputed.
enum ColumnFill {
    Replace(Series, MissingValueStrategy),
    DropRows,
    Skip(String),
}

/// Stateless cleaning engine.
///
/// The only setting is the fallback used when mean or median meets a
/// non-numeric column; [`clean`](Self::clean) takes it from the config.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleaningEngine {
    non_numeric_fallback: NonNumericFallback,
}

impl CleaningEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_non_numeric_fallback(fallback: NonNumericFallback) -> Self {
        Self {
            non_numeric_fallback: fallback,
        }
    }

    // ------------------------------------------------------------------------
    // Column names
    // ------------------------------------------------------------------------

    /// Normalize every column name and re-establish uniqueness.
    pub fn normalize_column_names(
        &self,
        table: TableHandle,
    ) -> Result<(TableHandle, Vec<ColumnRename>)> {
        let renames = names::plan_renames(&table.column_names());
        if renames.iter().all(|r| !r.changed()) {
            return Ok((table, renames));
        }

        let df = table.into_dataframe();
        let columns: Vec<Column> = df
            .get_columns()
            .iter()
            .zip(renames.iter())
            .map(|(col, rename)| {
                col.as_materialized_series()
                    .clone()
                    .with_name(rename.normalized.as_str().into())
                    .into_column()
            })
            .collect();

        for rename in renames.iter().filter(|r| r.changed()) {
            debug!("Renamed column '{}' -> '{}'", rename.original, rename.normalized);
            if rename.collided {
                warn!(
                    "Column '{}' collided after normalization, renamed to '{}'",
                    rename.original, rename.normalized
                );
            }
        }

        Ok((TableHandle::new(DataFrame::new(columns)?), renames))
    }

    // ------------------------------------------------------------------------
    // Duplicates
    // ------------------------------------------------------------------------

    /// Remove rows that exactly repeat an earlier row.
    ///
    /// Returns the table and the number of rows removed.
    pub fn remove_duplicate_rows(&self, table: TableHandle) -> Result<(TableHandle, usize)> {
        let keys = table.row_keys()?;
        let mut seen: HashSet<&str> = HashSet::with_capacity(keys.len());
        let keep: Vec<bool> = keys.iter().map(|k| seen.insert(k.as_str())).collect();
        let removed = keep.iter().filter(|k| !**k).count();

        if removed == 0 {
            return Ok((table, 0));
        }

        debug!("Removed {} duplicate rows", removed);
        let mask = BooleanChunked::from_slice("mask".into(), &keep);
        let df = table.into_dataframe().filter(&mask)?;
        Ok((TableHandle::new(df), removed))
    }

    // ------------------------------------------------------------------------
    // Missing values
    // ------------------------------------------------------------------------

    /// Impute missing values in `columns` (all columns when `None`).
    ///
    /// Each selected column gets one [`ColumnImputation`]. Naming a column
    /// that does not exist fails with `ColumnNotFound`.
    pub fn impute_missing(
        &self,
        table: TableHandle,
        strategy: MissingValueStrategy,
        columns: Option<&[String]>,
    ) -> Result<(TableHandle, Vec<ColumnImputation>)> {
        self.impute_with(table, strategy, columns, self.non_numeric_fallback)
    }

    /// Like [`impute_missing`](Self::impute_missing) with the strategy given
    /// by name.
    ///
    /// An unrecognized name is not fatal: every selected column that has
    /// nulls is reported as `SkippedUnsupported` and the table is returned
    /// unchanged.
    pub fn impute_missing_named(
        &self,
        table: TableHandle,
        strategy: &str,
        columns: Option<&[String]>,
    ) -> Result<(TableHandle, Vec<ColumnImputation>)> {
        match strategy.parse::<MissingValueStrategy>() {
            Ok(parsed) => self.impute_missing(table, parsed, columns),
            Err(e) => {
                warn!("{}; leaving missing values untouched", e);
                let selected = select_columns(&table, columns)?;
                let mut outcomes = Vec::with_capacity(selected.len());
                for name in selected {
                    let outcome = if table.series(&name)?.null_count() == 0 {
                        ImputationOutcome::SkippedAlreadyClean
                    } else {
                        ImputationOutcome::SkippedUnsupported {
                            reason: e.to_string(),
                        }
                    };
                    outcomes.push(ColumnImputation {
                        column: name,
                        outcome,
                    });
                }
                Ok((table, outcomes))
            }
        }
    }

    fn impute_with(
        &self,
        table: TableHandle,
        strategy: MissingValueStrategy,
        columns: Option<&[String]>,
        fallback: NonNumericFallback,
    ) -> Result<(TableHandle, Vec<ColumnImputation>)> {
        let selected = select_columns(&table, columns)?;
        let mut df = table.into_dataframe();
        let mut outcomes = Vec::with_capacity(selected.len());

        for name in selected {
            // NaN counts as missing.
            let series = nan_to_null(df.column(&name)?.as_materialized_series())?;
            let nulls = series.null_count();

            if nulls == 0 {
                outcomes.push(ColumnImputation {
                    column: name,
                    outcome: ImputationOutcome::SkippedAlreadyClean,
                });
                continue;
            }

            let outcome = match plan_fill(&series, strategy, fallback)? {
                ColumnFill::Replace(filled, applied) => {
                    let remaining = filled.null_count();
                    df.replace(&name, filled)?;
                    debug!(
                        "Filled {} nulls in '{}' with {}",
                        nulls - remaining,
                        name,
                        applied
                    );
                    ImputationOutcome::Filled {
                        strategy_applied: applied,
                        filled: nulls - remaining,
                        remaining_nulls: remaining,
                    }
                }
                ColumnFill::DropRows => {
                    df = df.filter(&StatisticalImputer::non_null_mask(&series))?;
                    debug!("Dropped {} rows with null '{}'", nulls, name);
                    ImputationOutcome::RowsDropped { rows: nulls }
                }
                ColumnFill::Skip(reason) => {
                    warn!("Skipped imputation of '{}': {}", name, reason);
                    ImputationOutcome::SkippedUnsupported { reason }
                }
            };

            outcomes.push(ColumnImputation {
                column: name,
                outcome,
            });
        }

        Ok((TableHandle::new(df), outcomes))
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    /// Cast each named column to its requested type.
    ///
    /// A column that fails to convert is left unchanged and reported as
    /// `Failed`; that is never fatal. Naming a column that does not exist
    /// fails with `ColumnNotFound`.
    pub fn coerce_types(
        &self,
        table: TableHandle,
        mapping: &BTreeMap<String, ColumnType>,
    ) -> Result<(TableHandle, Vec<ColumnCoercion>)> {
        if let Some(missing) = mapping.keys().find(|c| !table.has_column(c)) {
            return Err(AutodataError::ColumnNotFound(missing.clone()));
        }
        coerce_present(table, mapping)
    }

    // ------------------------------------------------------------------------
    // Outliers
    // ------------------------------------------------------------------------

    /// Remove outlier rows judged on `columns`.
    pub fn remove_outliers(
        &self,
        table: TableHandle,
        columns: &[String],
        method: OutlierMethod,
        threshold: f64,
    ) -> Result<(TableHandle, OutlierReport)> {
        let (df, report) =
            OutlierHandler::remove(table.into_dataframe(), columns, method, threshold)?;
        if report.rows_removed > 0 {
            debug!("Removed {} outlier rows ({})", report.rows_removed, method);
        }
        Ok((TableHandle::new(df), report))
    }

    // ------------------------------------------------------------------------
    // Full pipeline
    // ------------------------------------------------------------------------

    /// Run the cleaning pipeline.
    ///
    /// Order: remove duplicates, normalize names, impute, remove duplicates
    /// created by filling, then coerce types and remove outliers when the
    /// config asks for them. Config column names refer to normalized names.
    /// Columns the config names but the table lacks are reported, not fatal.
    pub fn clean(&self, table: TableHandle, config: &CleaningConfig) -> Result<CleaningOutput> {
        self.clean_observed(table, config, &mut |_| Ok(()))
    }

    /// [`clean`](Self::clean) with a hook called before every stage.
    ///
    /// Returning an error from the hook (e.g. `Cancelled`) aborts the run.
    pub fn clean_observed(
        &self,
        table: TableHandle,
        config: &CleaningConfig,
        on_stage: &mut dyn FnMut(CleaningStage) -> Result<()>,
    ) -> Result<CleaningOutput> {
        config.validate()?;

        let mut report = CleaningReport {
            rows_before: table.row_count(),
            columns_before: table.column_count(),
            ..Default::default()
        };
        info!(
            "Cleaning table with {} rows and {} columns",
            report.rows_before, report.columns_before
        );

        // 1. Duplicates
        on_stage(CleaningStage::Deduplicating)?;
        let (table, removed) = self.remove_duplicate_rows(table)?;
        report.duplicates_removed = removed;
        report.add_step(if removed > 0 {
            format!("Removed {} duplicate rows", removed)
        } else {
            "No duplicate rows found".to_string()
        });

        // 2. Names
        on_stage(CleaningStage::NormalizingNames)?;
        let (table, renames) = self.normalize_column_names(table)?;
        let changed = renames.iter().filter(|r| r.changed()).count();
        let collided = renames.iter().filter(|r| r.collided).count();
        report.add_step(format!(
            "Normalized {} column names ({} collisions resolved)",
            changed, collided
        ));
        report.renames = renames;

        // 3. Missing values
        on_stage(CleaningStage::Imputing)?;
        let strategy = config.missing_value_strategy;
        let (table, imputations) =
            self.impute_with(table, strategy, None, config.non_numeric_fallback)?;
        for imputation in &imputations {
            match &imputation.outcome {
                ImputationOutcome::Filled {
                    strategy_applied,
                    filled,
                    ..
                } if *filled > 0 => report.add_step(format!(
                    "Filled {} missing values in '{}' using {}",
                    filled, imputation.column, strategy_applied
                )),
                ImputationOutcome::RowsDropped { rows } => report.add_step(format!(
                    "Dropped {} rows with missing '{}'",
                    rows, imputation.column
                )),
                ImputationOutcome::SkippedUnsupported { reason } => report.add_step(format!(
                    "Skipped '{}': {}",
                    imputation.column, reason
                )),
                _ => {}
            }
        }
        report.imputations = imputations;

        // Filling can turn distinct rows into exact copies.
        let (mut table, removed) = self.remove_duplicate_rows(table)?;
        if removed > 0 {
            report.duplicates_removed += removed;
            report.add_step(format!(
                "Removed {} rows that became duplicates after imputation",
                removed
            ));
        }

        // 4. Types
        if config.coerces_types() {
            on_stage(CleaningStage::CoercingTypes)?;
            let (coerced, coercions) = coerce_present(table, &config.target_column_types)?;
            for coercion in &coercions {
                match &coercion.outcome {
                    CoercionOutcome::Converted { from, .. } => report.add_step(format!(
                        "Converted '{}' from {} to {}",
                        coercion.column, from, coercion.target
                    )),
                    CoercionOutcome::Failed { reason } => report.add_step(format!(
                        "Could not convert '{}' to {}: {}",
                        coercion.column, coercion.target, reason
                    )),
                    CoercionOutcome::AlreadyTyped => {}
                }
            }
            report.coercions = coercions;
            table = coerced;
        }

        // 5. Outliers
        if config.removes_outliers() {
            on_stage(CleaningStage::RemovingOutliers)?;
            let (present, absent): (Vec<String>, Vec<String>) = config
                .outlier_columns
                .iter()
                .cloned()
                .partition(|c| table.has_column(c));
            for column in &absent {
                warn!("Outlier column '{}' not found, skipping", column);
            }

            let (filtered, mut outliers) = self.remove_outliers(
                table,
                &present,
                config.outlier_method,
                config.outlier_threshold,
            )?;
            outliers.skipped_columns.extend(absent);
            report.add_step(format!(
                "Removed {} outlier rows using {} (threshold {})",
                outliers.rows_removed, config.outlier_method, config.outlier_threshold
            ));
            report.outliers = Some(outliers);
            table = filtered;
        }

        report.rows_after = table.row_count();
        report.columns_after = table.column_count();
        info!(
            "Cleaning complete: {} -> {} rows, {} duplicates removed, {} cells filled",
            report.rows_before,
            report.rows_after,
            report.duplicates_removed,
            report.cells_filled()
        );

        Ok(CleaningOutput { table, report })
    }
}

/// Resolve the column selection, failing on names the table lacks.
fn select_columns(table: &TableHandle, columns: Option<&[String]>) -> Result<Vec<String>> {
    match columns {
        None => Ok(table.column_names()),
        Some(list) => {
            if let Some(missing) = list.iter().find(|c| !table.has_column(c)) {
                return Err(AutodataError::ColumnNotFound(missing.clone()));
            }
            Ok(list.to_vec())
        }
    }
}

fn plan_fill(
    series: &Series,
    strategy: MissingValueStrategy,
    fallback: NonNumericFallback,
) -> Result<ColumnFill> {
    if strategy.requires_numeric() && !is_numeric_dtype(series.dtype()) {
        return Ok(match fallback {
            NonNumericFallback::ForwardFill => ColumnFill::Replace(
                StatisticalImputer::forward_fill(series).map_err(polars_or_other)?,
                MissingValueStrategy::ForwardFill,
            ),
            NonNumericFallback::Skip => ColumnFill::Skip(format!(
                "{} requires a numeric column, found {}",
                strategy,
                dtype_name(series.dtype())
            )),
        });
    }

    let filled = match strategy {
        MissingValueStrategy::Mean => StatisticalImputer::fill_mean(series),
        MissingValueStrategy::Median => StatisticalImputer::fill_median(series),
        MissingValueStrategy::Mode => StatisticalImputer::fill_mode(series),
        MissingValueStrategy::ForwardFill => StatisticalImputer::forward_fill(series).map(Some),
        MissingValueStrategy::BackwardFill => StatisticalImputer::backward_fill(series).map(Some),
        MissingValueStrategy::Drop => return Ok(ColumnFill::DropRows),
    }
    .map_err(polars_or_other)?;

    Ok(match filled {
        Some(series) => ColumnFill::Replace(series, strategy),
        None => ColumnFill::Skip(format!("{} needs at least one non-null value", strategy)),
    })
}

fn polars_or_other(err: anyhow::Error) -> AutodataError {
    match err.downcast::<PolarsError>() {
        Ok(polars) => AutodataError::Polars(polars),
        Err(other) => AutodataError::InvalidArgument(other.to_string()),
    }
}

/// Coerce the mapped columns that exist; absent ones are reported as failed.
fn coerce_present(
    table: TableHandle,
    mapping: &BTreeMap<String, ColumnType>,
) -> Result<(TableHandle, Vec<ColumnCoercion>)> {
    let mut df = table.into_dataframe();
    let mut coercions = Vec::with_capacity(mapping.len());

    for (name, target) in mapping {
        let Ok(column) = df.column(name) else {
            warn!("Cannot coerce '{}': column not found", name);
            coercions.push(ColumnCoercion {
                column: name.clone(),
                target: *target,
                outcome: CoercionOutcome::Failed {
                    reason: format!("column '{}' not found", name),
                },
            });
            continue;
        };
        let series = column.as_materialized_series().clone();

        if converters::is_already_typed(series.dtype(), *target) {
            coercions.push(ColumnCoercion {
                column: name.clone(),
                target: *target,
                outcome: CoercionOutcome::AlreadyTyped,
            });
            continue;
        }

        let outcome = match converters::coerce_series(&series, *target) {
            Ok(converted) => {
                let nulls_introduced = converted.null_count().saturating_sub(series.null_count());
                if nulls_introduced > 0 {
                    warn!(
                        "{} values in '{}' could not be parsed as {} and became null",
                        nulls_introduced, name, target
                    );
                }
                df.replace(name, converted)?;
                CoercionOutcome::Converted {
                    from: dtype_name(series.dtype()),
                    nulls_introduced,
                }
            }
            Err(e) => {
                warn!("Type coercion failed: {}", e);
                CoercionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        coercions.push(ColumnCoercion {
            column: name.clone(),
            target: *target,
            outcome,
        });
    }

    Ok((TableHandle::new(df), coercions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(df: DataFrame) -> TableHandle {
        TableHandle::new(df)
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn outcome_of<'a>(outcomes: &'a [ColumnImputation], column: &str) -> &'a ImputationOutcome {
        &outcomes.iter().find(|o| o.column == column).unwrap().outcome
    }

    // ========================================================================
    // Duplicates and names
    // ========================================================================

    #[test]
    fn test_remove_duplicates_keeps_first_in_order() {
        let t = table(df!["k" => ["A", "B", "A", "C"], "v" => [1, 2, 1, 3]].unwrap());
        let (out, removed) = CleaningEngine::new().remove_duplicate_rows(t).unwrap();

        assert_eq!(removed, 1);
        let expected = table(df!["k" => ["A", "B", "C"], "v" => [1, 2, 3]].unwrap());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_duplicates_with_nulls_match() {
        let t = table(df!["a" => [Some(1), None, None], "b" => [Some("x"), None, None]].unwrap());
        let (out, removed) = CleaningEngine::new().remove_duplicate_rows(t).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(out.row_count(), 2);
    }

    #[test]
    fn test_normalize_column_names() {
        let t = table(df![" User ID" => [1], "Email-Address!" => ["a@b.c"]].unwrap());
        let (out, renames) = CleaningEngine::new().normalize_column_names(t).unwrap();

        assert_eq!(out.column_names(), vec!["user_id", "emailaddress"]);
        assert!(renames.iter().all(|r| !r.collided));
    }

    #[test]
    fn test_normalize_column_names_collision() {
        let t = table(df!["Name" => ["a"], "name " => ["b"]].unwrap());
        let (out, renames) = CleaningEngine::new().normalize_column_names(t).unwrap();

        assert_eq!(out.column_names(), vec!["name", "name_1"]);
        assert!(renames[1].collided);
        assert_eq!(out.series("name_1").unwrap().str().unwrap().get(0), Some("b"));
    }

    // ========================================================================
    // Imputation
    // ========================================================================

    #[test]
    fn test_impute_mean_numeric() {
        let t = table(df!["x" => [Some(1.0), None, Some(3.0)]].unwrap());
        let (out, outcomes) = CleaningEngine::new()
            .impute_missing(t, MissingValueStrategy::Mean, None)
            .unwrap();

        assert_eq!(out.row_count(), 3);
        assert_eq!(out.series("x").unwrap().f64().unwrap().get(1), Some(2.0));
        assert_eq!(
            outcome_of(&outcomes, "x"),
            &ImputationOutcome::Filled {
                strategy_applied: MissingValueStrategy::Mean,
                filled: 1,
                remaining_nulls: 0,
            }
        );
    }

    #[test]
    fn test_impute_mean_text_falls_back_to_forward_fill() {
        let t = table(df!["s" => [Some("a"), None, Some("b")]].unwrap());
        let (out, outcomes) = CleaningEngine::new()
            .impute_missing(t, MissingValueStrategy::Mean, None)
            .unwrap();

        assert_eq!(out.series("s").unwrap().str().unwrap().get(1), Some("a"));
        assert!(matches!(
            outcome_of(&outcomes, "s"),
            ImputationOutcome::Filled {
                strategy_applied: MissingValueStrategy::ForwardFill,
                ..
            }
        ));
    }

    #[test]
    fn test_impute_mean_text_skip_fallback() {
        let t = table(df!["s" => [Some("a"), None]].unwrap());
        let engine = CleaningEngine::with_non_numeric_fallback(NonNumericFallback::Skip);
        let (out, outcomes) = engine
            .impute_missing(t, MissingValueStrategy::Median, None)
            .unwrap();

        assert_eq!(out.series("s").unwrap().null_count(), 1);
        assert!(matches!(
            outcome_of(&outcomes, "s"),
            ImputationOutcome::SkippedUnsupported { .. }
        ));
    }

    #[test]
    fn test_impute_drop_removes_rows() {
        let t = table(df!["a" => [Some(1), None, Some(3)], "b" => ["x", "y", "z"]].unwrap());
        let (out, outcomes) = CleaningEngine::new()
            .impute_missing(t, MissingValueStrategy::Drop, None)
            .unwrap();

        assert_eq!(out.row_count(), 2);
        assert_eq!(outcome_of(&outcomes, "a"), &ImputationOutcome::RowsDropped { rows: 1 });
        assert_eq!(outcome_of(&outcomes, "b"), &ImputationOutcome::SkippedAlreadyClean);
    }

    #[test]
    fn test_impute_selected_columns_only() {
        let t = table(df!["a" => [Some(1), None], "b" => [Some(1), None]].unwrap());
        let (out, outcomes) = CleaningEngine::new()
            .impute_missing(t, MissingValueStrategy::ForwardFill, Some(&cols(&["a"])))
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(out.series("a").unwrap().null_count(), 0);
        assert_eq!(out.series("b").unwrap().null_count(), 1);
    }

    #[test]
    fn test_impute_unknown_column_fails() {
        let t = table(df!["a" => [1]].unwrap());
        let err = CleaningEngine::new()
            .impute_missing(t, MissingValueStrategy::Mode, Some(&cols(&["zzz"])))
            .unwrap_err();
        assert!(matches!(err, AutodataError::ColumnNotFound(_)));
    }

    #[test]
    fn test_impute_named_unknown_strategy_is_noop() {
        let t = table(df!["a" => [Some(1), None], "b" => [1, 2]].unwrap());
        let (out, outcomes) = CleaningEngine::new()
            .impute_missing_named(t.clone(), "interpolate", None)
            .unwrap();

        assert_eq!(out, t);
        assert!(matches!(
            outcome_of(&outcomes, "a"),
            ImputationOutcome::SkippedUnsupported { .. }
        ));
        assert_eq!(outcome_of(&outcomes, "b"), &ImputationOutcome::SkippedAlreadyClean);
    }

    #[test]
    fn test_impute_named_accepts_aliases() {
        let t = table(df!["a" => [Some(1), None, Some(3)]].unwrap());
        let (out, _) = CleaningEngine::new()
            .impute_missing_named(t, "bfill", None)
            .unwrap();
        assert_eq!(out.series("a").unwrap().i32().unwrap().get(1), Some(3));
    }

    // ========================================================================
    // Coercion
    // ========================================================================

    #[test]
    fn test_coerce_types_reports_each_column() {
        let t = table(
            df![
                "qty" => ["1", "2", "3"],
                "bad" => ["1", "x", "3"],
                "when" => ["2024-01-01", "nope", "2024-02-01"],
                "id" => [1i64, 2, 3],
            ]
            .unwrap(),
        );
        let mut mapping = BTreeMap::new();
        mapping.insert("qty".to_string(), ColumnType::Integer);
        mapping.insert("bad".to_string(), ColumnType::Integer);
        mapping.insert("when".to_string(), ColumnType::Timestamp);
        mapping.insert("id".to_string(), ColumnType::Integer);

        let (out, coercions) = CleaningEngine::new().coerce_types(t, &mapping).unwrap();
        let by_name = |n: &str| coercions.iter().find(|c| c.column == n).unwrap().outcome.clone();

        assert_eq!(out.column_dtype("qty"), Some(DataType::Int64));
        assert_eq!(out.column_dtype("bad"), Some(DataType::String));
        assert!(matches!(by_name("bad"), CoercionOutcome::Failed { .. }));
        assert_eq!(
            by_name("when"),
            CoercionOutcome::Converted {
                from: "str".to_string(),
                nulls_introduced: 1
            }
        );
        assert_eq!(by_name("id"), CoercionOutcome::AlreadyTyped);
    }

    #[test]
    fn test_coerce_types_unknown_column_fails() {
        let t = table(df!["a" => [1]].unwrap());
        let mut mapping = BTreeMap::new();
        mapping.insert("b".to_string(), ColumnType::Text);
        assert!(matches!(
            CleaningEngine::new().coerce_types(t, &mapping).unwrap_err(),
            AutodataError::ColumnNotFound(_)
        ));
    }

    // ========================================================================
    // Full pipeline
    // ========================================================================

    #[test]
    fn test_clean_default_pipeline() {
        let t = table(
            df![
                " Score " => [Some(1.0), Some(1.0), None, Some(4.0)],
                "Team Name" => [Some("a"), Some("a"), Some("b"), None],
            ]
            .unwrap(),
        );
        let output = CleaningEngine::new().clean(t, &CleaningConfig::default()).unwrap();

        assert_eq!(output.table.column_names(), vec!["score", "team_name"]);
        // [1,a] [1,a] dedupe -> [1,a] [null,b] [4,null] -> ffill -> [1,a] [1,b] [4,b]
        assert_eq!(output.table.row_count(), 3);
        assert_eq!(output.report.duplicates_removed, 1);
        assert_eq!(output.report.rows_before, 4);
        assert_eq!(output.report.rows_after, 3);
        assert_eq!(output.report.cells_filled(), 2);
        assert!(!output.report.steps.is_empty());
    }

    #[test]
    fn test_clean_settles_duplicates_created_by_filling() {
        let t = table(df!["a" => [Some(1), None], "b" => [Some("x"), Some("x")]].unwrap());
        let output = CleaningEngine::new().clean(t, &CleaningConfig::default()).unwrap();
        assert_eq!(output.table.row_count(), 1);
        assert_eq!(output.report.duplicates_removed, 1);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let t = table(
            df![
                "A" => [Some(3), None, Some(3), Some(7), None],
                "a" => [Some("x"), Some("y"), Some("x"), None, Some("y")],
            ]
            .unwrap(),
        );
        let engine = CleaningEngine::new();
        let config = CleaningConfig::default();
        let once = engine.clean(t, &config).unwrap().table;
        let twice = engine.clean(once.clone(), &config).unwrap().table;
        assert_eq!(once, twice);
    }

    #[test]
    fn test_clean_with_optional_steps() {
        let t = table(
            df![
                "Value" => ["1", "2", "3", "4", "5", "100"],
                "Label" => ["a", "b", "c", "d", "e", "f"],
            ]
            .unwrap(),
        );
        let config = CleaningConfig::builder()
            .column_type("value", ColumnType::Float)
            .outlier_method(OutlierMethod::Iqr)
            .outlier_columns(["value", "ghost"])
            .build()
            .unwrap();

        let output = CleaningEngine::new().clean(t, &config).unwrap();
        assert_eq!(output.table.row_count(), 5);
        assert_eq!(output.table.column_dtype("value"), Some(DataType::Float64));

        let outliers = output.report.outliers.unwrap();
        assert_eq!(outliers.rows_removed, 1);
        assert_eq!(outliers.skipped_columns, vec!["ghost"]);
    }

    #[test]
    fn test_clean_observed_can_abort() {
        let t = table(df!["a" => [1, 2]].unwrap());
        let mut seen = Vec::new();
        let result = CleaningEngine::new().clean_observed(t, &CleaningConfig::default(), &mut |stage| {
            seen.push(stage);
            if stage == CleaningStage::Imputing {
                Err(AutodataError::Cancelled)
            } else {
                Ok(())
            }
        });

        assert!(matches!(result, Err(AutodataError::Cancelled)));
        assert_eq!(
            seen,
            vec![
                CleaningStage::Deduplicating,
                CleaningStage::NormalizingNames,
                CleaningStage::Imputing
            ]
        );
    }
}
