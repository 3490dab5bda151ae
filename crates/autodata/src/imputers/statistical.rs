//! Statistical imputation methods.
//!
//! Every fill returns a new Series with the same name. Mode, forward fill
//! and backward fill work by gathering existing values, so they keep the
//! column's dtype; mean and median produce Float64.

use crate::utils::{
    is_numeric_dtype, linear_quantile, mean_and_std, numeric_values, series_to_json_values,
};
use anyhow::Result;
use polars::prelude::*;
use std::collections::HashMap;

/// Statistical imputation methods for filling missing values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Fill nulls and NaNs with the mean of the remaining values.
    ///
    /// Returns `None` for non-numeric columns and columns with no usable
    /// value.
    pub fn fill_mean(series: &Series) -> Result<Option<Series>> {
        if !is_numeric_dtype(series.dtype()) {
            return Ok(None);
        }
        let values = numeric_values(series)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        match mean_and_std(&present) {
            Some((mean, _)) => Ok(Some(fill_missing(series, &values, mean))),
            None => Ok(None),
        }
    }

    /// Fill nulls and NaNs with the median of the remaining values.
    ///
    /// Returns `None` for non-numeric columns and columns with no usable
    /// value.
    pub fn fill_median(series: &Series) -> Result<Option<Series>> {
        if !is_numeric_dtype(series.dtype()) {
            return Ok(None);
        }
        let values = numeric_values(series)?;
        let mut present: Vec<f64> = values.iter().flatten().copied().collect();
        present.sort_by(|a, b| a.total_cmp(b));
        match linear_quantile(&present, 0.5) {
            Some(median) => Ok(Some(fill_missing(series, &values, median))),
            None => Ok(None),
        }
    }

    /// Fill nulls with the most frequent non-null value.
    ///
    /// Ties go to the value whose first occurrence comes earliest in the
    /// column. Returns `None` for an all-null column.
    pub fn fill_mode(series: &Series) -> Result<Option<Series>> {
        let Some(mode_idx) = mode_index(series)? else {
            return Ok(None);
        };

        let is_null = series.is_null();
        let indices: Vec<IdxSize> = (0..series.len())
            .map(|i| {
                if is_null.get(i).unwrap_or(false) {
                    mode_idx as IdxSize
                } else {
                    i as IdxSize
                }
            })
            .collect();

        Ok(Some(series.take_slice(&indices)?))
    }

    /// Each null takes the nearest preceding non-null value. Leading nulls
    /// stay null.
    pub fn forward_fill(series: &Series) -> Result<Series> {
        let is_null = series.is_null();
        let mut last_valid: Option<usize> = None;
        let mut indices: Vec<IdxSize> = Vec::with_capacity(series.len());

        for i in 0..series.len() {
            if is_null.get(i).unwrap_or(false) {
                indices.push(last_valid.unwrap_or(i) as IdxSize);
            } else {
                last_valid = Some(i);
                indices.push(i as IdxSize);
            }
        }

        Ok(series.take_slice(&indices)?)
    }

    /// Each null takes the nearest following non-null value. Trailing nulls
    /// stay null.
    pub fn backward_fill(series: &Series) -> Result<Series> {
        let is_null = series.is_null();
        let mut next_valid: Option<usize> = None;
        let mut indices: Vec<IdxSize> = vec![0; series.len()];

        for i in (0..series.len()).rev() {
            if is_null.get(i).unwrap_or(false) {
                indices[i] = next_valid.unwrap_or(i) as IdxSize;
            } else {
                next_valid = Some(i);
                indices[i] = i as IdxSize;
            }
        }

        Ok(series.take_slice(&indices)?)
    }

    /// Row mask that keeps non-null cells.
    pub fn non_null_mask(series: &Series) -> BooleanChunked {
        series.is_not_null()
    }
}

/// Position of the first occurrence of the mode.
fn mode_index(series: &Series) -> Result<Option<usize>> {
    let values = series_to_json_values(series)?;
    let is_null = series.is_null();

    // key -> (count, first index)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (i, value) in values.iter().enumerate() {
        if is_null.get(i).unwrap_or(false) || value.is_null() {
            continue;
        }
        counts
            .entry(value.to_string())
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, i));
    }

    Ok(counts
        .into_values()
        .max_by(|(ca, ia), (cb, ib)| ca.cmp(cb).then(ib.cmp(ia)))
        .map(|(_, first)| first))
}

/// Float64 copy of `values` with every gap set to `fill_value`.
fn fill_missing(series: &Series, values: &[Option<f64>], fill_value: f64) -> Series {
    let filled: Vec<f64> = values.iter().map(|v| v.unwrap_or(fill_value)).collect();
    Series::new(series.name().clone(), filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(series: &Series) -> Vec<Option<f64>> {
        series.f64().unwrap().into_iter().collect()
    }

    #[test]
    fn test_fill_mean() {
        let series = Series::new("x".into(), &[Some(1.0), None, Some(3.0)]);
        let filled = StatisticalImputer::fill_mean(&series).unwrap().unwrap();
        assert_eq!(floats(&filled), vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(filled.name().as_str(), "x");
    }

    #[test]
    fn test_mean_and_median_treat_nan_as_missing() {
        let series = Series::new("x".into(), &[Some(1.0), Some(f64::NAN), None, Some(3.0)]);

        let mean = StatisticalImputer::fill_mean(&series).unwrap().unwrap();
        assert_eq!(floats(&mean), vec![Some(1.0), Some(2.0), Some(2.0), Some(3.0)]);

        let median = StatisticalImputer::fill_median(&series).unwrap().unwrap();
        assert_eq!(floats(&median), vec![Some(1.0), Some(2.0), Some(2.0), Some(3.0)]);

        let only_nan = Series::new("x".into(), &[Some(f64::NAN), None]);
        assert!(StatisticalImputer::fill_mean(&only_nan).unwrap().is_none());
    }

    #[test]
    fn test_fill_median_integer_column() {
        let series = Series::new("x".into(), &[Some(1i64), None, Some(10), Some(3)]);
        let filled = StatisticalImputer::fill_median(&series).unwrap().unwrap();
        assert_eq!(
            floats(&filled),
            vec![Some(1.0), Some(3.0), Some(10.0), Some(3.0)]
        );
    }

    #[test]
    fn test_mean_on_text_is_unsupported() {
        let series = Series::new("x".into(), &[Some("a"), None]);
        assert!(StatisticalImputer::fill_mean(&series).unwrap().is_none());
    }

    #[test]
    fn test_mean_on_all_null_is_unsupported() {
        let series = Series::new("x".into(), &[None::<f64>, None]);
        assert!(StatisticalImputer::fill_mean(&series).unwrap().is_none());
        assert!(StatisticalImputer::fill_mode(&series).unwrap().is_none());
    }

    #[test]
    fn test_mode_tie_break_first_occurrence() {
        let series = Series::new("x".into(), &[Some(1i64), Some(2), Some(2), Some(1), None]);
        let filled = StatisticalImputer::fill_mode(&series).unwrap().unwrap();
        let values: Vec<Option<i64>> = filled.i64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(1), Some(2), Some(2), Some(1), Some(1)]);
        assert_eq!(filled.dtype(), &DataType::Int64);
    }

    #[test]
    fn test_mode_strings() {
        let series = Series::new(
            "c".into(),
            &[Some("b"), None, Some("a"), Some("a"), Some("b"), Some("a")],
        );
        let filled = StatisticalImputer::fill_mode(&series).unwrap().unwrap();
        assert_eq!(filled.str().unwrap().get(1), Some("a"));
    }

    #[test]
    fn test_forward_fill_keeps_leading_null() {
        let series = Series::new("x".into(), &[None, Some("a"), None, None, Some("b")]);
        let filled = StatisticalImputer::forward_fill(&series).unwrap();
        let values: Vec<Option<&str>> = filled.str().unwrap().into_iter().collect();
        assert_eq!(values, vec![None, Some("a"), Some("a"), Some("a"), Some("b")]);
    }

    #[test]
    fn test_backward_fill_keeps_trailing_null() {
        let series = Series::new("x".into(), &[Some(1i32), None, Some(3), None]);
        let filled = StatisticalImputer::backward_fill(&series).unwrap();
        let values: Vec<Option<i32>> = filled.i32().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(1), Some(3), Some(3), None]);
    }

    #[test]
    fn test_non_null_mask() {
        let series = Series::new("x".into(), &[Some(1i32), None, Some(3)]);
        let mask = StatisticalImputer::non_null_mask(&series);
        let values: Vec<Option<bool>> = mask.into_iter().collect();
        assert_eq!(values, vec![Some(true), Some(false), Some(true)]);
    }
}
