//! Outlier removal for numeric columns.
//!
//! IQR filtering is sequential: each column is evaluated on the table left
//! by the previous column's pass, so a surviving row is within bounds for
//! every evaluated column. Z-score filtering is joint: all statistics come
//! from the same input table and a row is dropped if any column flags it.
//! Null cells never cause a row to be dropped.

use crate::config::OutlierMethod;
use crate::error::{AutodataError, Result};
use crate::types::{OutlierColumnStats, OutlierReport};
use crate::utils::{is_numeric_dtype, linear_quantile, mean_and_std, numeric_values};
use polars::prelude::*;
use tracing::{debug, warn};

/// Handles outlier detection and row removal.
pub struct OutlierHandler;

impl OutlierHandler {
    /// Remove outlier rows from `df`.
    ///
    /// Fails with `ColumnNotFound` if a named column is absent and with
    /// `InvalidArgument` if the threshold is not a positive finite number.
    /// Non-numeric columns are skipped and listed in the report.
    pub fn remove(
        df: DataFrame,
        columns: &[String],
        method: OutlierMethod,
        threshold: f64,
    ) -> Result<(DataFrame, OutlierReport)> {
        let rows_before = df.height();

        if method == OutlierMethod::None {
            return Ok((df, OutlierReport::noop(method, threshold, rows_before)));
        }

        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(AutodataError::InvalidArgument(format!(
                "outlier threshold must be positive and finite, got {}",
                threshold
            )));
        }

        let available: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Some(missing) = columns.iter().find(|c| !available.contains(c)) {
            return Err(AutodataError::ColumnNotFound(missing.clone()));
        }

        let mut report = OutlierReport::noop(method, threshold, rows_before);
        let (numeric, skipped): (Vec<&String>, Vec<&String>) = columns
            .iter()
            .partition(|c| {
                df.column(c.as_str())
                    .map(|col| is_numeric_dtype(col.dtype()))
                    .unwrap_or(false)
            });

        for column in &skipped {
            warn!("Skipping non-numeric column '{}' for outlier removal", column);
        }
        report.skipped_columns = skipped.into_iter().cloned().collect();

        let df = match method {
            OutlierMethod::Iqr => Self::filter_iqr(df, &numeric, threshold, &mut report)?,
            OutlierMethod::Zscore => Self::filter_zscore(df, &numeric, threshold, &mut report)?,
            OutlierMethod::None => df,
        };

        report.rows_removed = rows_before - df.height();
        Ok((df, report))
    }

    fn filter_iqr(
        mut df: DataFrame,
        columns: &[&String],
        threshold: f64,
        report: &mut OutlierReport,
    ) -> Result<DataFrame> {
        for column in columns {
            let values = numeric_values(df.column(column.as_str())?.as_materialized_series())?;
            let mut sorted: Vec<f64> = values.iter().flatten().copied().collect();
            sorted.sort_by(|a, b| a.total_cmp(b));

            let (Some(q1), Some(q3)) = (linear_quantile(&sorted, 0.25), linear_quantile(&sorted, 0.75))
            else {
                report.columns.push(OutlierColumnStats {
                    column: column.to_string(),
                    lower_bound: None,
                    upper_bound: None,
                    flagged: 0,
                });
                continue;
            };

            let iqr = q3 - q1;
            let lower = q1 - threshold * iqr;
            let upper = q3 + threshold * iqr;

            let keep: Vec<bool> = values
                .iter()
                .map(|v| v.is_none_or(|x| x >= lower && x <= upper))
                .collect();
            let flagged = keep.iter().filter(|k| !**k).count();

            debug!(
                "IQR bounds for '{}': [{:.4}, {:.4}], {} rows flagged",
                column, lower, upper, flagged
            );

            if flagged > 0 {
                let mask = BooleanChunked::from_slice("mask".into(), &keep);
                df = df.filter(&mask)?;
            }

            report.columns.push(OutlierColumnStats {
                column: column.to_string(),
                lower_bound: Some(lower),
                upper_bound: Some(upper),
                flagged,
            });
        }

        Ok(df)
    }

    fn filter_zscore(
        df: DataFrame,
        columns: &[&String],
        threshold: f64,
        report: &mut OutlierReport,
    ) -> Result<DataFrame> {
        let mut keep = vec![true; df.height()];

        for column in columns {
            let values = numeric_values(df.column(column.as_str())?.as_materialized_series())?;
            let present: Vec<f64> = values.iter().flatten().copied().collect();

            let stats = mean_and_std(&present).filter(|(_, std)| *std > 0.0);
            let Some((mean, std)) = stats else {
                debug!("Column '{}' has zero variance, no z-score outliers", column);
                report.columns.push(OutlierColumnStats {
                    column: column.to_string(),
                    lower_bound: None,
                    upper_bound: None,
                    flagged: 0,
                });
                continue;
            };

            let mut flagged = 0;
            for (row, value) in values.iter().enumerate() {
                if let Some(x) = value
                    && (x - mean).abs() / std >= threshold
                {
                    flagged += 1;
                    keep[row] = false;
                }
            }

            debug!(
                "Z-score for '{}': mean={:.4}, std={:.4}, {} rows flagged",
                column, mean, std, flagged
            );

            report.columns.push(OutlierColumnStats {
                column: column.to_string(),
                lower_bound: Some(mean - threshold * std),
                upper_bound: Some(mean + threshold * std),
                flagged,
            });
        }

        if keep.iter().all(|k| *k) {
            return Ok(df);
        }
        let mask = BooleanChunked::from_slice("mask".into(), &keep);
        Ok(df.filter(&mask)?)
    }
}
