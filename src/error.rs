//! Error types for easyml

use thiserror::Error;

/// Result type alias for easyml operations
pub type Result<T> = std::result::Result<T, EasyMlError>;

/// Main error type for easyml
#[derive(Error, Debug)]
pub enum EasyMlError {
    #[error("No eligible data for file {file_id}: {reason}")]
    NoEligibleData { file_id: u64, reason: String },

    #[error("Unrecognized algorithm code: {0}")]
    UnrecognizedAlgorithm(i64),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("A model named '{0}' already exists")]
    PersistenceConflict(String),

    #[error("Storage error: {0}")]
    PersistenceFault(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EasyMlError {
    /// Shorthand for a rejected hyperparameter value
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        EasyMlError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Length mismatch between two sequences that must line up
    pub fn length_mismatch(expected: usize, actual: usize) -> Self {
        EasyMlError::ShapeError {
            expected: format!("length = {}", expected),
            actual: format!("length = {}", actual),
        }
    }
}

impl From<serde_json::Error> for EasyMlError {
    fn from(err: serde_json::Error) -> Self {
        EasyMlError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for EasyMlError {
    fn from(err: ndarray::ShapeError) -> Self {
        EasyMlError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for EasyMlError {
    fn from(err: polars::error::PolarsError) -> Self {
        EasyMlError::DataError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EasyMlError::NoEligibleData {
            file_id: 7,
            reason: "all columns ignored".to_string(),
        };
        assert_eq!(err.to_string(), "No eligible data for file 7: all columns ignored");
        assert_eq!(
            EasyMlError::UnrecognizedAlgorithm(42).to_string(),
            "Unrecognized algorithm code: 42"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EasyMlError = io_err.into();
        assert!(matches!(err, EasyMlError::IoError(_)));
    }

    #[test]
    fn test_invalid_parameter_helper() {
        let err = EasyMlError::invalid_parameter("nnc_k", "zero", "expected an integer");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: nnc_k = zero, expected an integer"
        );
    }
}
