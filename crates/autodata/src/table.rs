//! In-memory table handle shared by the cleaning engine and the orchestrator.
//!
//! [`TableHandle`] wraps a polars [`DataFrame`], which already guarantees
//! equal-length columns and unique column names. Engine operations take the
//! handle by value and return a new one, so a raw table is never aliased by
//! its cleaned counterpart.

use crate::error::{AutodataError, Result};
use crate::utils::{dtype_name, series_to_json_values};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// A row-oriented JSON record (`column -> value`).
pub type Record = Map<String, Value>;

/// Homogeneously-typed, nullable columns of equal length.
#[derive(Debug, Clone, Default)]
pub struct TableHandle {
    df: DataFrame,
}

impl TableHandle {
    pub fn new(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn row_count(&self) -> usize {
        self.df.height()
    }

    pub fn column_count(&self) -> usize {
        self.df.width()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.column_count())
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.df.get_column_names().iter().any(|n| n.as_str() == name)
    }

    pub fn column_dtype(&self, name: &str) -> Option<DataType> {
        self.df
            .column(name)
            .ok()
            .map(|c| c.dtype().clone())
    }

    /// Borrow a column, failing with `ColumnNotFound` if it is absent.
    pub fn series(&self, name: &str) -> Result<&Series> {
        if !self.has_column(name) {
            return Err(AutodataError::ColumnNotFound(name.to_string()));
        }
        Ok(self.df.column(name)?.as_materialized_series())
    }

    pub fn as_dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_dataframe(self) -> DataFrame {
        self.df
    }

    /// Contiguous row range `[offset, offset + len)`, clipped to the table.
    pub fn slice(&self, offset: usize, len: usize) -> TableHandle {
        TableHandle::new(self.df.slice(offset as i64, len))
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// Read a CSV file with a header row, inferring column types.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(100))
            .try_into_reader_with_file_path(Some(path.clone()))?
            .finish()
            .map_err(|e| {
                AutodataError::Ingestion(format!("{}: {}", path.display(), e))
            })?;
        Ok(Self::new(df))
    }

    /// Read CSV bytes with a header row from any reader.
    pub fn from_csv_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(100))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .map_err(|e| AutodataError::Ingestion(e.to_string()))?;
        Ok(Self::new(df))
    }

    /// Build a table from a JSON array of objects.
    ///
    /// Keys are unioned in first-seen order; a key missing from a record is
    /// null. Records without any key at all are rejected, since a frame
    /// with no columns cannot hold their row count. Each column is typed from its non-null values: all integers give
    /// Int64, all numbers Float64, all booleans Boolean, anything else String.
    pub fn from_json_records(records: &[Value]) -> Result<Self> {
        let mut keys: Vec<String> = Vec::new();
        let mut objects: Vec<&Map<String, Value>> = Vec::with_capacity(records.len());

        for (idx, record) in records.iter().enumerate() {
            let object = record.as_object().ok_or_else(|| {
                AutodataError::Ingestion(format!("record {} is not a JSON object", idx))
            })?;
            for key in object.keys() {
                if !keys.iter().any(|k| k == key) {
                    keys.push(key.clone());
                }
            }
            objects.push(object);
        }

        if keys.is_empty() {
            if !objects.is_empty() {
                return Err(AutodataError::Ingestion(format!(
                    "{} records but none of them has a field",
                    objects.len()
                )));
            }
            return Ok(Self::new(DataFrame::empty()));
        }

        let mut columns = Vec::with_capacity(keys.len());
        for key in &keys {
            let cells: Vec<&Value> = objects
                .iter()
                .map(|o| o.get(key).unwrap_or(&Value::Null))
                .collect();
            columns.push(json_column(key, &cells).into_column());
        }

        Ok(Self::new(DataFrame::new(columns)?))
    }

    /// Parse a JSON document holding an array of objects.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        match value {
            Value::Array(records) => Self::from_json_records(&records),
            _ => Err(AutodataError::Ingestion(
                "expected a JSON array of objects".to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------------
    // Egress
    // ------------------------------------------------------------------------

    /// Column-wise JSON view of every cell.
    pub fn json_columns(&self) -> Result<Vec<Vec<Value>>> {
        self.df
            .get_columns()
            .iter()
            .map(|c| Ok(series_to_json_values(c.as_materialized_series())?))
            .collect()
    }

    /// Row-oriented records, one JSON object per row.
    pub fn to_records(&self) -> Result<Vec<Record>> {
        let names = self.column_names();
        let columns = self.json_columns()?;
        let mut records = Vec::with_capacity(self.row_count());

        for row in 0..self.row_count() {
            let mut record = Map::with_capacity(names.len());
            for (name, values) in names.iter().zip(columns.iter()) {
                record.insert(name.clone(), values[row].clone());
            }
            records.push(record);
        }

        Ok(records)
    }

    /// One canonical string per row; equal rows give equal keys.
    pub(crate) fn row_keys(&self) -> Result<Vec<String>> {
        let columns = self.json_columns()?;
        let mut keys = Vec::with_capacity(self.row_count());
        for row in 0..self.row_count() {
            let cells: Vec<&Value> = columns.iter().map(|c| &c[row]).collect();
            keys.push(serde_json::to_string(&cells)?);
        }
        Ok(keys)
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())?;
        let mut df = self.df.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .finish(&mut df)?;
        Ok(())
    }
}

impl From<DataFrame> for TableHandle {
    fn from(df: DataFrame) -> Self {
        Self::new(df)
    }
}

impl PartialEq for TableHandle {
    /// Same column names, same dtypes and equal cells (null equals null).
    fn eq(&self, other: &Self) -> bool {
        if self.shape() != other.shape() || self.column_names() != other.column_names() {
            return false;
        }

        let same_dtypes = self
            .df
            .get_columns()
            .iter()
            .zip(other.df.get_columns())
            .all(|(a, b)| a.dtype() == b.dtype());
        if !same_dtypes {
            return false;
        }

        match (self.json_columns(), other.json_columns()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

fn json_column(name: &str, cells: &[&Value]) -> Series {
    let non_null: Vec<&&Value> = cells.iter().filter(|v| !v.is_null()).collect();

    if !non_null.is_empty() && non_null.iter().all(|v| v.is_i64()) {
        let values: Vec<Option<i64>> = cells.iter().map(|v| v.as_i64()).collect();
        return Series::new(name.into(), values);
    }

    if !non_null.is_empty() && non_null.iter().all(|v| v.is_number()) {
        let values: Vec<Option<f64>> = cells.iter().map(|v| v.as_f64()).collect();
        return Series::new(name.into(), values);
    }

    if !non_null.is_empty() && non_null.iter().all(|v| v.is_boolean()) {
        let values: Vec<Option<bool>> = cells.iter().map(|v| v.as_bool()).collect();
        return Series::new(name.into(), values);
    }

    let values: Vec<Option<String>> = cells
        .iter()
        .map(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();
    Series::new(name.into(), values)
}

// =============================================================================
// Table Statistics
// =============================================================================

/// Summary of a table used by the data quality report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub total_rows: usize,
    pub total_columns: usize,
    pub missing_cells: usize,
    pub duplicate_rows: usize,
    /// `(column, dtype)` in column order.
    pub column_types: Vec<(String, String)>,
    /// Leading rows as records.
    pub sample: Vec<Record>,
}

impl TableStats {
    pub fn from_table(table: &TableHandle, sample_rows: usize) -> Result<Self> {
        let df = table.as_dataframe();
        let missing_cells = df.get_columns().iter().map(|c| c.null_count()).sum();

        let mut seen = std::collections::HashSet::new();
        let duplicate_rows = table
            .row_keys()?
            .into_iter()
            .filter(|key| !seen.insert(key.clone()))
            .count();

        let column_types = df
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), dtype_name(c.dtype())))
            .collect();

        Ok(Self {
            total_rows: table.row_count(),
            total_columns: table.column_count(),
            missing_cells,
            duplicate_rows,
            column_types,
            sample: table.slice(0, sample_rows).to_records()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> TableHandle {
        TableHandle::new(
            df![
                "id" => [1i64, 2, 2],
                "name" => [Some("a"), None, None],
            ]
            .unwrap(),
        )
    }

    #[test]
    fn test_accessors() {
        let table = sample();
        assert_eq!(table.shape(), (3, 2));
        assert_eq!(table.column_names(), vec!["id", "name"]);
        assert!(table.has_column("id"));
        assert!(!table.has_column("missing"));
        assert_eq!(table.column_dtype("id"), Some(DataType::Int64));
        assert!(matches!(
            table.series("nope"),
            Err(AutodataError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_to_records() {
        let records = sample().to_records().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(Value::Object(records[0].clone()), json!({"id": 1, "name": "a"}));
        assert_eq!(Value::Object(records[1].clone()), json!({"id": 2, "name": null}));
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(sample(), sample());

        let other = TableHandle::new(
            df![
                "id" => [1i64, 2, 3],
                "name" => [Some("a"), None, None],
            ]
            .unwrap(),
        );
        assert!(sample() != other);

        let renamed = TableHandle::new(
            df![
                "ID" => [1i64, 2, 2],
                "name" => [Some("a"), None, None],
            ]
            .unwrap(),
        );
        assert!(sample() != renamed);
    }

    #[test]
    fn test_from_json_records_types_and_missing_keys() {
        let records = vec![
            json!({"id": 1, "score": 1.5, "ok": true, "tag": "x"}),
            json!({"id": 2, "score": 2, "tag": 7}),
            json!({"id": null, "extra": "late"}),
        ];
        let table = TableHandle::from_json_records(&records).unwrap();

        assert_eq!(table.column_names(), vec!["id", "score", "ok", "tag", "extra"]);
        assert_eq!(table.column_dtype("id"), Some(DataType::Int64));
        assert_eq!(table.column_dtype("score"), Some(DataType::Float64));
        assert_eq!(table.column_dtype("ok"), Some(DataType::Boolean));
        assert_eq!(table.column_dtype("tag"), Some(DataType::String));
        assert_eq!(table.series("id").unwrap().null_count(), 1);
        assert_eq!(table.series("extra").unwrap().null_count(), 2);
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        let err = TableHandle::from_json_records(&[json!(1)]).unwrap_err();
        assert_eq!(err.error_code(), "INGESTION_FAILED");
        assert!(TableHandle::from_json_str("{\"a\": 1}").is_err());
    }

    #[test]
    fn test_from_json_records_without_fields() {
        let err = TableHandle::from_json_records(&[json!({}), json!({})]).unwrap_err();
        assert_eq!(err.error_code(), "INGESTION_FAILED");
        assert!(err.to_string().contains("2 records"));

        assert!(TableHandle::from_json_records(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_from_csv_reader() {
        let csv = "a,b\n1,x\n2,\n";
        let table = TableHandle::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.shape(), (2, 2));
        assert_eq!(table.series("b").unwrap().null_count(), 1);
    }

    #[test]
    fn test_table_stats() {
        let stats = TableStats::from_table(&sample(), 2).unwrap();
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.total_columns, 2);
        assert_eq!(stats.missing_cells, 2);
        assert_eq!(stats.duplicate_rows, 1);
        assert_eq!(stats.column_types[0], ("id".to_string(), "i64".to_string()));
        assert_eq!(stats.sample.len(), 2);
    }
}
