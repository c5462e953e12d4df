//! Shared error types for the airlift workspace

use thiserror::Error;

/// Errors produced by the shared utility modules
#[derive(Error, Debug)]
pub enum CommonError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Result type alias using CommonError
pub type Result<T> = std::result::Result<T, CommonError>;
