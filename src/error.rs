//! Error types for feature generation, post-processing and the predictor pool.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by this crate.
///
/// Tokenization itself never fails: unknown words become `[UNK]`. Everything
/// that can go wrong happens at construction time (vocabulary, configuration,
/// pool pre-warm) or at the predictor boundary.
#[derive(Debug, Error)]
pub enum RocketQaError {
    /// The vocabulary file could not be opened or read.
    #[error("failed to read vocabulary file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration, detected eagerly at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller-supplied input that can be corrected and retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A tensor did not have the shape the consumer requires.
    #[error("shape mismatch: expected {expected}, got {actual:?}")]
    ShapeMismatch { expected: String, actual: Vec<usize> },

    /// A tensor carried a different element type than the consumer requires.
    #[error("unexpected tensor element type: expected {expected}, got {actual}")]
    DataType {
        expected: &'static str,
        actual: &'static str,
    },

    /// The external predictor failed (creation, clone or run).
    #[error("predictor error: {0}")]
    Predictor(String),

    /// The pool was closed while waiting for, or before requesting, a handle.
    #[error("predictor pool is closed")]
    PoolClosed,

    /// No handle became free before the deadline.
    #[error("timed out after {0:?} waiting for a free predictor")]
    PoolTimeout(std::time::Duration),
}

impl RocketQaError {
    /// Returns true if the caller can fix its input and retry the same call.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::PoolTimeout(_))
    }
}

impl From<toml::de::Error> for RocketQaError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(format!("invalid TOML: {e}"))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RocketQaError>;
