//! Error types for tabframe

use thiserror::Error;

use crate::stype::Stype;

/// Result type alias for tabframe operations
pub type Result<T> = std::result::Result<T, TabFrameError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum TabFrameError {
    #[error("Data error: {0}")]
    DataError(String),

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

    #[error("Column '{column}' is missing stat {stat}")]
    MissingStat { column: String, stat: String },

    #[error("{encoder} does not support stype {stype}")]
    UnsupportedStype { encoder: String, stype: Stype },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Encoder not initialized: {0}")]
    EncoderNotInitialized(String),

    #[error("backward called before forward on {0}")]
    BackwardBeforeForward(String),
}

impl From<polars::error::PolarsError> for TabFrameError {
    fn from(err: polars::error::PolarsError) -> Self {
        TabFrameError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for TabFrameError {
    fn from(err: serde_json::Error) -> Self {
        TabFrameError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TabFrameError {
    fn from(err: ndarray::ShapeError) -> Self {
        TabFrameError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
