//! Error types for slice caching and prefetching

use crate::types::DataType;
use thiserror::Error;

/// Main error type for volslice operations
#[derive(Error, Debug)]
pub enum SliceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source read error: {0}")]
    SourceRead(String),

    #[error("Invalid axis: {0} (expected 0, 1 or 2)")]
    InvalidAxis(usize),

    #[error("Invalid volume format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported volume format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Data type mismatch: slice holds {actual}, requested {expected}")]
    DataTypeMismatch { expected: DataType, actual: DataType },

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Background task failed: {0}")]
    Worker(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Specialized Result type for volslice operations
pub type Result<T> = std::result::Result<T, SliceError>;

impl From<serde_json::Error> for SliceError {
    fn from(err: serde_json::Error) -> Self {
        SliceError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SliceError {
    fn from(err: tokio::task::JoinError) -> Self {
        SliceError::Worker(err.to_string())
    }
}
