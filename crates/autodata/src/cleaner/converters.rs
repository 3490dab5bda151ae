//! Type conversion functions for column coercion.
//!
//! Numeric and text conversions are all-or-nothing: the first value that
//! cannot be converted aborts the column. Timestamp conversion is lenient and
//! turns unparsable values into nulls.

use crate::config::ColumnType;
use crate::error::{AutodataError, Result};
use crate::utils::{
    epoch_to_millis, is_float_dtype, is_integer_dtype, is_numeric_dtype, parse_timestamp_millis,
};
use polars::prelude::*;

/// Characters commonly used in numeric formatting that are stripped before parsing.
const NUMERIC_FORMAT_CHARS: [char; 6] = [',', '$', '%', '€', '£', ' '];

fn timestamp_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Whether `dtype` already satisfies `target`.
pub(crate) fn is_already_typed(dtype: &DataType, target: ColumnType) -> bool {
    match target {
        ColumnType::Integer => matches!(dtype, DataType::Int64),
        ColumnType::Float => matches!(dtype, DataType::Float64),
        ColumnType::Text => matches!(dtype, DataType::String),
        ColumnType::Timestamp => matches!(dtype, DataType::Datetime(_, _)),
    }
}

/// Convert a series to `target`, returning the new series.
pub(crate) fn coerce_series(series: &Series, target: ColumnType) -> Result<Series> {
    match target {
        ColumnType::Integer => to_integer(series),
        ColumnType::Float => to_float(series),
        ColumnType::Text => to_text(series),
        ColumnType::Timestamp => to_timestamp(series),
    }
}

fn failure(series: &Series, target: ColumnType, reason: impl Into<String>) -> AutodataError {
    AutodataError::TypeCoercionFailed {
        column: series.name().to_string(),
        target_type: target.to_string(),
        reason: reason.into(),
    }
}

fn clean_numeric_string(s: &str) -> String {
    let mut result = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        result = result.replace(c, "");
    }
    result
}

fn parse_integer(raw: &str) -> Option<i64> {
    let cleaned = clean_numeric_string(raw);
    if let Ok(v) = cleaned.parse::<i64>() {
        return Some(v);
    }
    float_to_i64(cleaned.parse::<f64>().ok()?)
}

/// Whole finite floats that fit in i64; `i64::MAX as f64` rounds up to 2^63,
/// so the upper bound is exclusive.
fn float_to_i64(x: f64) -> Option<i64> {
    (x.is_finite() && x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64)
        .then_some(x as i64)
}

fn parse_float(raw: &str) -> Option<f64> {
    clean_numeric_string(raw).parse::<f64>().ok()
}

/// Walk a string series, parsing each value. Nulls stay null; the first value
/// that fails to parse, blank strings included, aborts.
fn parse_strings<T>(
    series: &Series,
    target: ColumnType,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    let str_series = series.str()?;
    let mut result_vec = Vec::with_capacity(str_series.len());

    for (row, opt_val) in str_series.into_iter().enumerate() {
        match opt_val {
            Some(val) => match parse(val) {
                Some(parsed) => result_vec.push(Some(parsed)),
                None => {
                    return Err(failure(
                        series,
                        target,
                        format!("value '{}' at row {} cannot be parsed", val, row),
                    ));
                }
            },
            None => result_vec.push(None),
        }
    }

    Ok(result_vec)
}

fn to_integer(series: &Series) -> Result<Series> {
    let dtype = series.dtype();

    if is_integer_dtype(dtype) || matches!(dtype, DataType::Boolean) {
        return Ok(series.strict_cast(&DataType::Int64)?);
    }

    if is_float_dtype(dtype) {
        let cast = series.cast(&DataType::Float64)?;
        let mut result_vec: Vec<Option<i64>> = Vec::with_capacity(cast.len());
        for (row, v) in cast.f64()?.into_iter().enumerate() {
            match v {
                Some(x) => match float_to_i64(x) {
                    Some(v) => result_vec.push(Some(v)),
                    None => {
                        return Err(failure(
                            series,
                            ColumnType::Integer,
                            format!("value {} at row {} is not a whole number in i64 range", x, row),
                        ));
                    }
                },
                None => result_vec.push(None),
            }
        }
        return Ok(Series::new(series.name().clone(), result_vec));
    }

    if matches!(dtype, DataType::String) {
        let values = parse_strings(series, ColumnType::Integer, parse_integer)?;
        return Ok(Series::new(series.name().clone(), values));
    }

    Err(failure(
        series,
        ColumnType::Integer,
        format!("cannot convert {} to integer", dtype),
    ))
}

fn to_float(series: &Series) -> Result<Series> {
    let dtype = series.dtype();

    if is_numeric_dtype(dtype) || matches!(dtype, DataType::Boolean) {
        return Ok(series.strict_cast(&DataType::Float64)?);
    }

    if matches!(dtype, DataType::String) {
        let values = parse_strings(series, ColumnType::Float, parse_float)?;
        return Ok(Series::new(series.name().clone(), values));
    }

    Err(failure(
        series,
        ColumnType::Float,
        format!("cannot convert {} to float", dtype),
    ))
}

fn to_text(series: &Series) -> Result<Series> {
    series
        .strict_cast(&DataType::String)
        .map_err(|e| failure(series, ColumnType::Text, e.to_string()))
}

/// Parse into millisecond timestamps. Values that cannot be interpreted
/// become null instead of failing the column.
fn to_timestamp(series: &Series) -> Result<Series> {
    let dtype = series.dtype();

    let millis: Vec<Option<i64>> = if matches!(dtype, DataType::String) {
        series
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_timestamp_millis))
            .collect()
    } else if is_integer_dtype(dtype) {
        series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.and_then(epoch_to_millis))
            .collect()
    } else if matches!(dtype, DataType::Date | DataType::Datetime(_, _)) {
        return Ok(series.cast(&timestamp_dtype())?);
    } else {
        return Err(failure(
            series,
            ColumnType::Timestamp,
            format!("cannot convert {} to timestamp", dtype),
        ));
    };

    Ok(Series::new(series.name().clone(), millis).cast(&timestamp_dtype())?)
}
