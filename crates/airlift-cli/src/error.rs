//! Error types for the Airlift CLI
//!
//! All errors are user-facing; messages state what went wrong and, where
//! there is one, the command that fixes it.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// Migration engine operation failed
    #[error("{0}")]
    Engine(#[from] airlift_engine::AirliftError),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your AIRLIFT_* environment variables or .env file.")]
    Config(String),

    /// A command-line argument did not parse
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File system operation failed
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON rendering failed
    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_suggests_environment() {
        let err = CliError::config("no source URL set");
        assert!(err.to_string().contains("AIRLIFT_"));
    }

    #[test]
    fn test_engine_errors_pass_through_unchanged() {
        let err = CliError::from(airlift_engine::AirliftError::NotFound(
            "entity 42".to_string(),
        ));
        assert!(err.to_string().contains("entity 42"));
    }
}
