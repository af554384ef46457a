//! Error types for attribution computations

use thiserror::Error;

/// Result type alias for attribution operations
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Main error type for the attribution engine
#[derive(Error, Debug)]
pub enum ExplainError {
    #[error("Schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    #[error("Empty reference set: no baseline can be estimated")]
    EmptyReferenceSet,

    #[error("Non-finite model output: {0}")]
    NonFiniteOutput(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ExplainError {
    /// Shorthand for a [`ExplainError::SchemaMismatch`] built from displayable parts
    pub fn schema(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> Self {
        ExplainError::SchemaMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Shorthand for a [`ExplainError::InvalidParameter`]
    pub fn invalid(
        name: impl Into<String>,
        value: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        ExplainError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::prelude::PolarsError> for ExplainError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        ExplainError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ExplainError {
    fn from(err: serde_json::Error) -> Self {
        ExplainError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ExplainError {
    fn from(err: ndarray::ShapeError) -> Self {
        ExplainError::SchemaMismatch {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
