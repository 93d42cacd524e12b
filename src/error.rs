//! Error types for labeled data storage

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Dimension mismatch for {what}: expected {expected} rows, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Storage was built without a target")]
    MissingTarget,

    #[error("Estimator does not support sample weights: {0}")]
    UnsupportedWeights(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StorageError {
    pub(crate) fn dimension_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        StorageError::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

impl From<polars::error::PolarsError> for StorageError {
    fn from(err: polars::error::PolarsError) -> Self {
        match err {
            polars::error::PolarsError::ColumnNotFound(name) => {
                StorageError::ColumnNotFound(name.to_string())
            }
            other => StorageError::DataError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::dimension_mismatch("target", 10, 9);
        assert_eq!(
            err.to_string(),
            "Dimension mismatch for target: expected 10 rows, got 9"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::IoError(_)));
    }

    #[test]
    fn test_error_from_polars_missing_column() {
        let df = polars::df!("a" => &[1.0, 2.0]).unwrap();
        let err: StorageError = df.column("b").unwrap_err().into();
        assert!(matches!(err, StorageError::ColumnNotFound(_)));
    }
}
