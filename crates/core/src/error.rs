//! Error types for medbot.
//!
//! A single error enum covers every failure category in the workspace.
//! Configuration errors are fatal at startup; every other variant is a
//! per-query failure that the session layer turns into a visible message.

use thiserror::Error;

/// Unified error type for medbot.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors (dimension or metric mismatch, missing index,
    /// unknown provider). Fatal during initialization.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The vector index could not be read at query time.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The embedding service failed or timed out.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The language model call failed or timed out.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Caller supplied an unusable argument (empty query, k = 0).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Session lifecycle errors (unknown or closed session)
    #[error("Session error: {0}")]
    Session(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error must abort initialization rather than a single query.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(AppError::Config("dim".to_string()).is_fatal());
        assert!(!AppError::IndexUnavailable("gone".to_string()).is_fatal());
        assert!(!AppError::Embedding("timeout".to_string()).is_fatal());
        assert!(!AppError::Llm("boom".to_string()).is_fatal());
    }

    #[test]
    fn test_display_includes_category() {
        let err = AppError::Embedding("service down".to_string());
        assert_eq!(err.to_string(), "Embedding error: service down");
    }
}
