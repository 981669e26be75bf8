//! Error types for regstack

use thiserror::Error;

/// Result type alias for regstack operations
pub type Result<T> = std::result::Result<T, StackError>;

/// Main error type for the regression stacking pipeline
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Optimization error: {0}")]
    OptimizationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No base models selected, nothing to stack")]
    NoBaseModels,
}

impl From<polars::error::PolarsError> for StackError {
    fn from(err: polars::error::PolarsError) -> Self {
        StackError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for StackError {
    fn from(err: serde_json::Error) -> Self {
        StackError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for StackError {
    fn from(err: ndarray::ShapeError) -> Self {
        StackError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StackError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StackError = io_err.into();
        assert!(matches!(err, StackError::IoError(_)));
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = StackError::InvalidParameter {
            name: "kernel".to_string(),
            value: "cubic".to_string(),
            reason: "expected one of rbf, linear, poly".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameter: kernel = cubic, expected one of rbf, linear, poly"
        );
    }
}
