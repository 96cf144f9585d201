//! Error types with stage-tagged diagnostics.
//!
//! Every unrecoverable failure names the pipeline stage it came from
//! (config, dataset, transform, checkpoint, evaluation) so a failed run
//! can be triaged from the message alone.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for demodular operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the training and evaluation pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration value is invalid.
    #[error("Invalid configuration value for '{field}': {message}")]
    Config { field: String, message: String },

    /// Sample identifier does not match the expected delimiter layout.
    #[error("Malformed sample identifier '{id}': {message}")]
    Metadata { id: String, message: String },

    /// Spectral transform cannot process the input.
    #[error("Spectral transform failed: {0}")]
    Transform(String),

    /// Tensor shape mismatch between collaborators.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    Shape { expected: Vec<usize>, actual: Vec<usize> },

    /// Paired dataset invariant violated (X/Y batches do not correspond).
    #[error("Dataset pairing violation: {0}")]
    Dataset(String),

    /// Checkpoint read/write failure.
    #[error("Checkpoint error at {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Create a checkpoint error for a path.
    pub fn checkpoint(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Checkpoint { path: path.into(), message: message.into() }
    }

    /// Pipeline stage this error belongs to, for exit diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Metadata { .. } | Self::Dataset(_) => "dataset",
            Self::Transform(_) | Self::Shape { .. } => "transform",
            Self::Checkpoint { .. } => "checkpoint",
            Self::Serialization(_) | Self::Io { .. } => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tags() {
        let err = Error::Config { field: "n_fft".into(), message: "must be positive".into() };
        assert_eq!(err.stage(), "config");

        let err = Error::Metadata { id: "bad".into(), message: "too few fields".into() };
        assert_eq!(err.stage(), "dataset");

        let err = Error::checkpoint("/tmp/x", "missing");
        assert_eq!(err.stage(), "checkpoint");
    }

    #[test]
    fn test_io_error_keeps_context() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::io("reading latest pointer", io_err);
        let msg = err.to_string();
        assert!(msg.contains("reading latest pointer"));
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = Error::Shape { expected: vec![16, 2, 64, 5], actual: vec![16, 2, 32, 5] };
        let msg = err.to_string();
        assert!(msg.contains("[16, 2, 64, 5]"));
        assert!(msg.contains("[16, 2, 32, 5]"));
    }
}
