//! Error types for the cleaning engine and the analysis layer.
//!
//! Errors are built with `thiserror` and serialize as `{code, message}` so
//! callers can ship them across a process boundary unchanged.
//!
//! Most cleaning problems are *not* errors: an unsupported strategy, a failed
//! per-column coercion or a skipped non-numeric column is recorded in the
//! cleaning report and the pipeline keeps going. The variants here cover the
//! conditions that are fatal to a single call.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for `autodata`.
#[derive(Error, Debug)]
pub enum AutodataError {
    /// Processing was cancelled through a [`CancellationToken`](crate::CancellationToken).
    #[error("Processing cancelled")]
    Cancelled,

    /// A column named explicitly by the caller does not exist in the table.
    #[error("Column '{0}' not found in table")]
    ColumnNotFound(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A strategy, method or type name that is not recognized.
    #[error("Unsupported {kind}: '{name}'")]
    UnsupportedStrategy { kind: &'static str, name: String },

    /// Invalid argument to a single call (e.g. a zero batch size).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A column could not be cast to the requested type.
    #[error("Failed to coerce column '{column}' to {target_type}: {reason}")]
    TypeCoercionFailed {
        column: String,
        target_type: String,
        reason: String,
    },

    /// The analysis capability failed (network, service or protocol error).
    #[error("Capability '{capability}' failed: {reason}")]
    CapabilityInvocation { capability: String, reason: String },

    /// The analysis capability returned no text.
    #[error("Capability '{0}' returned an empty response")]
    EmptyResponse(String),

    /// A single capability call exceeded its time budget.
    #[error("Capability call timed out after {}ms", .0.as_millis())]
    Timeout(std::time::Duration),

    /// Input could not be turned into a table.
    #[error("Failed to ingest table: {0}")]
    Ingestion(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error (only with the "ai" feature).
    #[cfg(feature = "ai")]
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Error with added context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AutodataError>,
    },
}

impl AutodataError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AutodataError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::UnsupportedStrategy { .. } => "UNSUPPORTED_STRATEGY",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::TypeCoercionFailed { .. } => "TYPE_COERCION_FAILED",
            Self::CapabilityInvocation { .. } => "CAPABILITY_INVOCATION_FAILED",
            Self::EmptyResponse(_) => "EMPTY_RESPONSE",
            Self::Timeout(_) => "TIMEOUT",
            Self::Ingestion(_) => "INGESTION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            #[cfg(feature = "ai")]
            Self::HttpRequest(_) => "HTTP_REQUEST_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Configuration and per-batch failures degrade instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::InvalidConfig(_)
            | Self::UnsupportedStrategy { .. }
            | Self::TypeCoercionFailed { .. }
            | Self::CapabilityInvocation { .. }
            | Self::EmptyResponse(_)
            | Self::Timeout(_) => true,
            Self::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

impl Serialize for AutodataError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("AutodataError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for `autodata` operations.
pub type Result<T> = std::result::Result<T, AutodataError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| AutodataError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_code() {
        assert_eq!(AutodataError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            AutodataError::ColumnNotFound("age".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
        assert_eq!(AutodataError::Timeout(Duration::from_secs(30)).error_code(), "TIMEOUT");
    }

    #[test]
    fn test_unsupported_strategy_message() {
        let error = AutodataError::UnsupportedStrategy {
            kind: "missing value strategy",
            name: "interpolate".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unsupported missing value strategy: 'interpolate'"
        );
    }

    #[test]
    fn test_is_recoverable() {
        assert!(AutodataError::Timeout(Duration::from_millis(5)).is_recoverable());
        assert!(AutodataError::InvalidConfig("x".to_string()).is_recoverable());
        assert!(!AutodataError::InvalidArgument("batch size".to_string()).is_recoverable());
        assert!(!AutodataError::ColumnNotFound("x".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_serialization() {
        let error = AutodataError::ColumnNotFound("Salary".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("Salary"));
    }

    #[test]
    fn test_with_context_preserves_code() {
        let error = AutodataError::ColumnNotFound("id".to_string())
            .with_context("While removing outliers");
        assert!(error.to_string().contains("While removing outliers"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
    }
}
