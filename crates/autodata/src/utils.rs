//! Shared utilities for the cleaning engine and the analysis layer.
//!
//! This module contains common helper functions used across multiple modules
//! to reduce code duplication and ensure consistency.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde_json::Value;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is an integer type.
#[inline]
pub fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Check if a DataType is a float type.
#[inline]
pub fn is_float_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    is_integer_dtype(dtype) || is_float_dtype(dtype)
}

/// Check if a DataType is a datetime type.
#[inline]
pub fn is_datetime_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Datetime(_, _) | DataType::Date | DataType::Time
    )
}

/// Short, stable name for a dtype, used in reports and prompts.
pub fn dtype_name(dtype: &DataType) -> String {
    match dtype {
        DataType::String => "str".to_string(),
        DataType::Boolean => "bool".to_string(),
        DataType::Datetime(_, _) => "datetime".to_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// Value Conversion Utilities
// =============================================================================

/// Convert every cell of a Series into a JSON value (null stays null).
///
/// Integers become JSON integers, floats become JSON numbers (NaN and
/// infinities become null), everything else that is not a bool is rendered
/// through polars' string cast.
pub fn series_to_json_values(series: &Series) -> PolarsResult<Vec<Value>> {
    let dtype = series.dtype();

    if matches!(dtype, DataType::Boolean) {
        return Ok(series
            .bool()?
            .into_iter()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
            .collect());
    }

    if is_integer_dtype(dtype) {
        let cast = series.cast(&DataType::Int64)?;
        return Ok(cast
            .i64()?
            .into_iter()
            .map(|v| v.map(Value::from).unwrap_or(Value::Null))
            .collect());
    }

    if is_float_dtype(dtype) {
        let cast = series.cast(&DataType::Float64)?;
        return Ok(cast
            .f64()?
            .into_iter()
            .map(|v| {
                v.and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            })
            .collect());
    }

    let cast = if matches!(dtype, DataType::String) {
        series.clone()
    } else {
        series.cast(&DataType::String)?
    };

    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null))
        .collect())
}

/// Numeric view of a Series; nulls and NaN become `None`.
pub fn numeric_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Float NaN cells as nulls, so they count as missing. Other dtypes are
/// returned as is.
pub fn nan_to_null(series: &Series) -> PolarsResult<Series> {
    let name = series.name().clone();
    Ok(match series.dtype() {
        DataType::Float64 => {
            let values: Vec<Option<f64>> = series
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| !x.is_nan()))
                .collect();
            Series::new(name, values)
        }
        DataType::Float32 => {
            let values: Vec<Option<f32>> = series
                .f32()?
                .into_iter()
                .map(|v| v.filter(|x| !x.is_nan()))
                .collect();
            Series::new(name, values)
        }
        _ => series.clone(),
    })
}

/// Collect sample values from a Series (non-null values only).
pub fn collect_sample_values(series: &Series, max_samples: usize) -> Vec<String> {
    let non_null = series.drop_nulls();
    let sample_size = std::cmp::min(max_samples, non_null.len());
    let mut samples = Vec::with_capacity(sample_size);

    for i in 0..sample_size {
        if let Ok(val) = non_null.get(i) {
            match val {
                AnyValue::String(s) => samples.push(s.to_string()),
                AnyValue::StringOwned(s) => samples.push(s.to_string()),
                other => samples.push(format!("{}", other)),
            }
        }
    }

    samples
}

// =============================================================================
// Statistics Utilities
// =============================================================================

/// Quantile of an ascending-sorted slice using linear interpolation between
/// the closest order statistics.
///
/// Returns `None` for an empty slice.
pub fn linear_quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Population mean and standard deviation.
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

// =============================================================================
// Timestamp Parsing Utilities
// =============================================================================

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d"];

/// Parse a textual timestamp into milliseconds since the Unix epoch (UTC).
///
/// Accepts RFC 3339, common ISO-like date/time layouts, plain dates and
/// integer epoch values in seconds or milliseconds. Returns `None` when
/// nothing matches.
pub fn parse_timestamp_millis(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }

    if let Some(ms) = s.parse::<i64>().ok().and_then(epoch_to_millis) {
        return Some(ms);
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }

    None
}

/// Interpret an integer as epoch seconds or milliseconds by magnitude.
pub fn epoch_to_millis(epoch: i64) -> Option<i64> {
    if (1_000_000_000..2_000_000_000).contains(&epoch) {
        Some(epoch * 1000)
    } else if (1_000_000_000_000..2_000_000_000_000).contains(&epoch) {
        Some(epoch)
    } else {
        None
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_predicates() {
        assert!(is_numeric_dtype(&DataType::Int32));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(is_integer_dtype(&DataType::UInt8));
        assert!(!is_integer_dtype(&DataType::Float32));
        assert!(is_datetime_dtype(&DataType::Date));
    }

    #[test]
    fn test_series_to_json_values() {
        let ints = Series::new("a".into(), &[Some(1i32), None, Some(3)]);
        assert_eq!(
            series_to_json_values(&ints).unwrap(),
            vec![Value::from(1), Value::Null, Value::from(3)]
        );

        let floats = Series::new("b".into(), &[Some(1.5f64), Some(f64::NAN), None]);
        let values = series_to_json_values(&floats).unwrap();
        assert_eq!(values[0], Value::from(1.5));
        assert_eq!(values[1], Value::Null);
        assert_eq!(values[2], Value::Null);

        let strings = Series::new("c".into(), &[Some("x"), None]);
        assert_eq!(
            series_to_json_values(&strings).unwrap(),
            vec![Value::from("x"), Value::Null]
        );

        let bools = Series::new("d".into(), &[Some(true), None]);
        assert_eq!(
            series_to_json_values(&bools).unwrap(),
            vec![Value::Bool(true), Value::Null]
        );
    }

    #[test]
    fn test_numeric_values_treats_nan_as_missing() {
        let series = Series::new("x".into(), &[Some(1.0f64), Some(f64::NAN), None]);
        assert_eq!(numeric_values(&series).unwrap(), vec![Some(1.0), None, None]);
    }

    #[test]
    fn test_linear_quantile() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        assert_eq!(linear_quantile(&sorted, 0.25), Some(2.25));
        assert_eq!(linear_quantile(&sorted, 0.75), Some(4.75));
        assert_eq!(linear_quantile(&sorted, 0.0), Some(1.0));
        assert_eq!(linear_quantile(&sorted, 1.0), Some(100.0));
        assert_eq!(linear_quantile(&[], 0.5), None);
        assert_eq!(linear_quantile(&[7.0], 0.25), Some(7.0));
    }

    #[test]
    fn test_mean_and_std_population() {
        let (mean, std) = mean_and_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(mean, 5.0);
        assert_eq!(std, 2.0);
        assert!(mean_and_std(&[]).is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let day = 1_705_276_800_000; // 2024-01-15T00:00:00Z
        assert_eq!(parse_timestamp_millis("2024-01-15"), Some(day));
        assert_eq!(parse_timestamp_millis("2024/01/15"), Some(day));
        assert_eq!(parse_timestamp_millis("01/15/2024"), Some(day));
        assert_eq!(parse_timestamp_millis("2024-01-15 00:00:00"), Some(day));
        assert_eq!(parse_timestamp_millis("2024-01-15T00:00:00Z"), Some(day));
        assert_eq!(parse_timestamp_millis("1705276800"), Some(day));
        assert_eq!(parse_timestamp_millis("1705276800000"), Some(day));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp_millis("not a date"), None);
        assert_eq!(parse_timestamp_millis(""), None);
        assert_eq!(parse_timestamp_millis("42"), None);
        assert_eq!(parse_timestamp_millis("2024-13-45"), None);
    }

    #[test]
    fn test_collect_sample_values() {
        let series = Series::new("s".into(), &[None, Some("a"), Some("b"), Some("c")]);
        assert_eq!(collect_sample_values(&series, 2), vec!["a", "b"]);
    }
}
