//! Error taxonomy for migration runs
//!
//! One enum covers the engine: infrastructure failures convert via `#[from]`,
//! domain failures carry enough context to be actionable in tracker error
//! fields. `is_transient` is the projection the external scheduler uses to
//! decide whether re-invoking a failed tracker is worthwhile.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the migration engine
#[derive(Error, Debug)]
pub enum AirliftError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source responded, but not with what we asked for
    #[error("Source error: {0}")]
    Source(String),

    /// Extraction failed for a relation
    #[error("Extraction failed for {relation}: {message}")]
    Extract { relation: String, message: String },

    /// A transformer rejected a record
    #[error("Transformation failed for {relation}: {message}")]
    Transform { relation: String, message: String },

    /// Loading a record into the destination failed
    #[error("Load failed for {relation}: {message}")]
    Load { relation: String, message: String },

    /// A record is missing the field its natural key derives from
    #[error("Record in {relation} is missing key field '{field}'")]
    MissingKey { relation: String, field: String },

    /// An archive member failed path-safety validation
    #[error("Unsafe archive member {path:?}: {reason}")]
    UnsafePath { path: PathBuf, reason: String },

    /// A transfer exceeded a configured size cap
    #[error("{what} exceeded the {limit} byte limit")]
    SizeLimit { what: String, limit: u64 },

    /// The dedupe ledger could not be consulted; dedupe must not be bypassed
    #[error("Dedupe ledger unavailable: {0}")]
    CacheUnavailable(String),

    /// The run observed a cancellation signal
    #[error("Migration aborted")]
    Aborted,

    /// A status transition that the state machine does not allow
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No pipeline is registered for the relation
    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    /// Entity or tracker lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Checksum computation or verification failed
    #[error("Checksum error: {0}")]
    Checksum(#[from] airlift_common::CommonError),

    /// Wiki bundle handoff failed
    #[error("Bundle import failed: {0}")]
    Bundle(#[source] anyhow::Error),
}

impl AirliftError {
    /// Whether the external scheduler should consider retrying the tracker.
    ///
    /// Network and ledger failures are worth a retry; validation and domain
    /// failures will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AirliftError::Http(_)
                | AirliftError::Database(_)
                | AirliftError::CacheUnavailable(_)
                | AirliftError::Source(_)
        )
    }
}

/// Result type alias using AirliftError
pub type Result<T> = std::result::Result<T, AirliftError>;
