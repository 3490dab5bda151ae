//! Configuration types for cleaning and analysis.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic setup. Every strategy, method and type tag can
//! also be parsed from its textual name, so configs can come from a CLI flag
//! or a JSON file as easily as from code.

use crate::error::AutodataError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Strategy for imputing missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingValueStrategy {
    /// Mean of the non-null values (numeric columns only)
    Mean,
    /// Median of the non-null values (numeric columns only)
    Median,
    /// Most frequent non-null value, first occurrence wins ties
    Mode,
    /// Drop rows where the column is null
    Drop,
    /// Nearest preceding non-null value
    #[default]
    #[serde(alias = "ffill")]
    ForwardFill,
    /// Nearest following non-null value
    #[serde(alias = "bfill")]
    BackwardFill,
}

impl MissingValueStrategy {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::Drop => "drop",
            Self::ForwardFill => "forward_fill",
            Self::BackwardFill => "backward_fill",
        }
    }

    /// Whether this strategy only makes sense on numeric columns.
    pub fn requires_numeric(&self) -> bool {
        matches!(self, Self::Mean | Self::Median)
    }
}

impl fmt::Display for MissingValueStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingValueStrategy {
    type Err = AutodataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "mode" | "most_frequent" => Ok(Self::Mode),
            "drop" => Ok(Self::Drop),
            "forward_fill" | "ffill" | "pad" => Ok(Self::ForwardFill),
            "backward_fill" | "bfill" | "backfill" => Ok(Self::BackwardFill),
            _ => Err(AutodataError::UnsupportedStrategy {
                kind: "missing value strategy",
                name: s.to_string(),
            }),
        }
    }
}

/// What to do when a numeric-only strategy meets a non-numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NonNumericFallback {
    /// Fill the column with forward fill instead
    #[default]
    ForwardFill,
    /// Leave the column untouched and report it as skipped
    Skip,
}

impl FromStr for NonNumericFallback {
    type Err = AutodataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "forward_fill" | "ffill" => Ok(Self::ForwardFill),
            "skip" | "none" => Ok(Self::Skip),
            _ => Err(AutodataError::UnsupportedStrategy {
                kind: "non-numeric fallback",
                name: s.to_string(),
            }),
        }
    }
}

/// Method for detecting outliers in numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    /// Keep rows within `[Q1 - t*IQR, Q3 + t*IQR]`, applied column by column
    Iqr,
    /// Drop rows with `|z| >= t` in any selected column
    #[serde(alias = "z_score")]
    Zscore,
    /// No outlier removal
    #[default]
    None,
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Iqr => "iqr",
            Self::Zscore => "zscore",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for OutlierMethod {
    type Err = AutodataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "iqr" => Ok(Self::Iqr),
            "zscore" | "z_score" | "z" => Ok(Self::Zscore),
            "none" | "off" => Ok(Self::None),
            _ => Err(AutodataError::UnsupportedStrategy {
                kind: "outlier method",
                name: s.to_string(),
            }),
        }
    }
}

/// Target type for column coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit signed integer
    #[serde(alias = "int")]
    Integer,
    /// 64-bit float
    Float,
    /// UTF-8 text
    #[serde(alias = "str", alias = "string")]
    Text,
    /// Millisecond-precision timestamp
    #[serde(alias = "datetime")]
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

impl FromStr for ColumnType {
    type Err = AutodataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "int" | "integer" | "int64" | "i64" => Ok(Self::Integer),
            "float" | "float64" | "f64" | "double" | "numeric" => Ok(Self::Float),
            "str" | "string" | "text" | "object" => Ok(Self::Text),
            "datetime" | "timestamp" | "date" | "datetime64" => Ok(Self::Timestamp),
            _ => Err(AutodataError::UnsupportedStrategy {
                kind: "column type",
                name: s.to_string(),
            }),
        }
    }
}

fn normalize_token(s: &str) -> String {
    s.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Configuration for the cleaning engine.
///
/// Use [`CleaningConfig::builder()`] to create a validated configuration.
/// Column names in `outlier_columns` and `target_column_types` refer to the
/// *normalized* names, since `clean` normalizes names before those steps run.
///
/// # Example
///
/// ```rust,ignore
/// use autodata::config::{CleaningConfig, MissingValueStrategy, OutlierMethod};
///
/// let config = CleaningConfig::builder()
///     .missing_value_strategy(MissingValueStrategy::Median)
///     .outlier_method(OutlierMethod::Iqr)
///     .outlier_columns(["salary"])
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Strategy used by the imputation step.
    /// Default: ForwardFill
    pub missing_value_strategy: MissingValueStrategy,

    /// Behavior of mean/median on non-numeric columns.
    /// Default: ForwardFill
    pub non_numeric_fallback: NonNumericFallback,

    /// Outlier method applied after imputation and coercion.
    /// Default: None
    pub outlier_method: OutlierMethod,

    /// IQR multiplier or z-score cutoff. Must be positive.
    /// Default: 1.5
    pub outlier_threshold: f64,

    /// Columns evaluated for outliers.
    /// Default: empty (the step is skipped)
    pub outlier_columns: Vec<String>,

    /// Requested column types.
    /// Default: empty (the step is skipped)
    pub target_column_types: BTreeMap<String, ColumnType>,
}

/// Default IQR multiplier.
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 1.5;

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            missing_value_strategy: MissingValueStrategy::default(),
            non_numeric_fallback: NonNumericFallback::default(),
            outlier_method: OutlierMethod::default(),
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            outlier_columns: Vec::new(),
            target_column_types: BTreeMap::new(),
        }
    }
}

impl CleaningConfig {
    /// Create a new configuration builder.
    pub fn builder() -> CleaningConfigBuilder {
        CleaningConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.outlier_threshold.is_finite() || self.outlier_threshold <= 0.0 {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "outlier_threshold".to_string(),
                value: self.outlier_threshold,
            });
        }

        if self.outlier_columns.iter().any(|c| c.trim().is_empty())
            || self.target_column_types.keys().any(|c| c.trim().is_empty())
        {
            return Err(ConfigValidationError::EmptyColumnName);
        }

        Ok(())
    }

    /// Whether `clean` runs the coercion step.
    pub fn coerces_types(&self) -> bool {
        !self.target_column_types.is_empty()
    }

    /// Whether `clean` runs the outlier step.
    pub fn removes_outliers(&self) -> bool {
        self.outlier_method != OutlierMethod::None && !self.outlier_columns.is_empty()
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be positive and finite)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Column names in the configuration must not be empty")]
    EmptyColumnName,

    #[error("Invalid batch size: {0} (must be at least 1)")]
    InvalidBatchSize(usize),

    #[error("Invalid concurrency: {0} (must be at least 1)")]
    InvalidConcurrency(usize),

    #[error("Invalid batch timeout: {0} seconds (must be at least 1)")]
    InvalidTimeout(u64),
}

impl From<ConfigValidationError> for AutodataError {
    fn from(err: ConfigValidationError) -> Self {
        AutodataError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`CleaningConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct CleaningConfigBuilder {
    missing_value_strategy: Option<MissingValueStrategy>,
    non_numeric_fallback: Option<NonNumericFallback>,
    outlier_method: Option<OutlierMethod>,
    outlier_threshold: Option<f64>,
    outlier_columns: Vec<String>,
    target_column_types: BTreeMap<String, ColumnType>,
}

impl CleaningConfigBuilder {
    /// Set the imputation strategy.
    pub fn missing_value_strategy(mut self, strategy: MissingValueStrategy) -> Self {
        self.missing_value_strategy = Some(strategy);
        self
    }

    /// Set the fallback for mean/median on non-numeric columns.
    pub fn non_numeric_fallback(mut self, fallback: NonNumericFallback) -> Self {
        self.non_numeric_fallback = Some(fallback);
        self
    }

    /// Set the outlier method.
    pub fn outlier_method(mut self, method: OutlierMethod) -> Self {
        self.outlier_method = Some(method);
        self
    }

    /// Set the outlier threshold (IQR multiplier or z-score cutoff).
    pub fn outlier_threshold(mut self, threshold: f64) -> Self {
        self.outlier_threshold = Some(threshold);
        self
    }

    /// Add columns to evaluate for outliers.
    pub fn outlier_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outlier_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    /// Request a type for one column.
    pub fn column_type(mut self, column: impl Into<String>, ty: ColumnType) -> Self {
        self.target_column_types.insert(column.into(), ty);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `CleaningConfig` or an error if validation fails.
    pub fn build(self) -> Result<CleaningConfig, ConfigValidationError> {
        let config = CleaningConfig {
            missing_value_strategy: self.missing_value_strategy.unwrap_or_default(),
            non_numeric_fallback: self.non_numeric_fallback.unwrap_or_default(),
            outlier_method: self.outlier_method.unwrap_or_default(),
            outlier_threshold: self.outlier_threshold.unwrap_or(DEFAULT_OUTLIER_THRESHOLD),
            outlier_columns: self.outlier_columns,
            target_column_types: self.target_column_types,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Default number of rows per analysis batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Configuration for the batch analysis orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Rows per batch. The last batch may be smaller.
    /// Default: 20
    pub batch_size: usize,

    /// Maximum number of batches in flight. 1 means strictly sequential.
    /// Default: 1
    pub max_concurrency: usize,

    /// Per-batch time budget in seconds. A batch that exceeds it is recorded
    /// as failed; its siblings keep running.
    /// Default: None (no timeout)
    pub batch_timeout_secs: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: 1,
            batch_timeout_secs: None,
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.batch_size == 0 {
            return Err(ConfigValidationError::InvalidBatchSize(self.batch_size));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigValidationError::InvalidConcurrency(
                self.max_concurrency,
            ));
        }
        if self.batch_timeout_secs == Some(0) {
            return Err(ConfigValidationError::InvalidTimeout(0));
        }
        Ok(())
    }
}

/// Builder for [`AnalysisConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    batch_size: Option<usize>,
    max_concurrency: Option<usize>,
    batch_timeout_secs: Option<u64>,
}

impl AnalysisConfigBuilder {
    /// Set the number of rows per batch.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set the maximum number of concurrent batches.
    pub fn max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = Some(workers);
        self
    }

    /// Set the per-batch timeout in seconds.
    pub fn batch_timeout_secs(mut self, secs: u64) -> Self {
        self.batch_timeout_secs = Some(secs);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<AnalysisConfig, ConfigValidationError> {
        let config = AnalysisConfig {
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            max_concurrency: self.max_concurrency.unwrap_or(1),
            batch_timeout_secs: self.batch_timeout_secs,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CleaningConfig::default();
        assert_eq!(
            config.missing_value_strategy,
            MissingValueStrategy::ForwardFill
        );
        assert_eq!(config.non_numeric_fallback, NonNumericFallback::ForwardFill);
        assert_eq!(config.outlier_method, OutlierMethod::None);
        assert_eq!(config.outlier_threshold, 1.5);
        assert!(!config.coerces_types());
        assert!(!config.removes_outliers());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = CleaningConfig::builder()
            .missing_value_strategy(MissingValueStrategy::Median)
            .outlier_method(OutlierMethod::Zscore)
            .outlier_threshold(3.0)
            .outlier_columns(["age", "salary"])
            .column_type("joined", ColumnType::Timestamp)
            .build()
            .unwrap();

        assert_eq!(config.missing_value_strategy, MissingValueStrategy::Median);
        assert_eq!(config.outlier_threshold, 3.0);
        assert_eq!(config.outlier_columns, vec!["age", "salary"]);
        assert_eq!(
            config.target_column_types.get("joined"),
            Some(&ColumnType::Timestamp)
        );
        assert!(config.coerces_types());
        assert!(config.removes_outliers());
    }

    #[test]
    fn test_validation_invalid_threshold() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = CleaningConfig::builder().outlier_threshold(bad).build();
            assert!(matches!(
                result.unwrap_err(),
                ConfigValidationError::InvalidThreshold { .. }
            ));
        }
    }

    #[test]
    fn test_validation_empty_column_name() {
        let result = CleaningConfig::builder().outlier_columns([" "]).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::EmptyColumnName
        ));
    }

    #[test]
    fn test_strategy_from_str_aliases() {
        assert_eq!(
            "ffill".parse::<MissingValueStrategy>().unwrap(),
            MissingValueStrategy::ForwardFill
        );
        assert_eq!(
            "Backward-Fill".parse::<MissingValueStrategy>().unwrap(),
            MissingValueStrategy::BackwardFill
        );
        assert_eq!(
            "zscore".parse::<OutlierMethod>().unwrap(),
            OutlierMethod::Zscore
        );
        assert_eq!("datetime".parse::<ColumnType>().unwrap(), ColumnType::Timestamp);
        assert_eq!("int".parse::<ColumnType>().unwrap(), ColumnType::Integer);
        assert_eq!("str".parse::<ColumnType>().unwrap(), ColumnType::Text);
    }

    #[test]
    fn test_unknown_strategy_is_config_error() {
        let err = "interpolate".parse::<MissingValueStrategy>().unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_STRATEGY");
        assert!("mad".parse::<OutlierMethod>().is_err());
        assert!("decimal".parse::<ColumnType>().is_err());
    }

    #[test]
    fn test_cleaning_config_from_json() {
        let json = r#"{
            "missing_value_strategy": "bfill",
            "outlier_method": "iqr",
            "outlier_columns": ["price"],
            "target_column_types": {"qty": "int", "when": "datetime"}
        }"#;

        let config: CleaningConfig =
            serde_json::from_str(json).expect("Should deserialize partial JSON");

        assert_eq!(
            config.missing_value_strategy,
            MissingValueStrategy::BackwardFill
        );
        assert_eq!(config.outlier_method, OutlierMethod::Iqr);
        assert_eq!(config.outlier_threshold, 1.5);
        assert_eq!(
            config.target_column_types.get("qty"),
            Some(&ColumnType::Integer)
        );
        assert_eq!(
            config.target_column_types.get("when"),
            Some(&ColumnType::Timestamp)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_analysis_config_defaults_and_validation() {
        let config = AnalysisConfig::builder().build().unwrap();
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.batch_timeout_secs, None);

        assert!(matches!(
            AnalysisConfig::builder().batch_size(0).build().unwrap_err(),
            ConfigValidationError::InvalidBatchSize(0)
        ));
        assert!(matches!(
            AnalysisConfig::builder().max_concurrency(0).build().unwrap_err(),
            ConfigValidationError::InvalidConcurrency(0)
        ));
        assert!(AnalysisConfig::builder().batch_timeout_secs(0).build().is_err());
    }

    #[test]
    fn test_validation_error_converts_to_invalid_config() {
        let err: AutodataError = ConfigValidationError::InvalidBatchSize(0).into();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
