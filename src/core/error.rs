//! Error types for kernel evaluation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SVMError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Trained model has no support vectors")]
    EmptyModel,

    #[error("Index {index} out of range for {len} elements")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid evaluator state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Device allocation failed: requested {requested} bytes, {available} available")]
    AllocationFailed { requested: usize, available: usize },

    #[error("Device error: {0}")]
    Device(String),

    #[error("Parameter layout mismatch for '{entry}': {reason}")]
    ParameterLayout { entry: &'static str, reason: String },

    #[error("Dispatch of '{entry}' timed out after {elapsed_ms} ms")]
    Timeout { entry: &'static str, elapsed_ms: u128 },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Config error: {0}")]
    ConfigError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SVMError>;
