// ==============================================================================
// error.rs - Core Error Types
// ==============================================================================
// Description: Error taxonomy shared by persistence, validation and artifacts
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use thiserror::Error;

/// Errors raised by the core library.
///
/// Validation and state errors carry user-facing text; the remaining
/// variants wrap the underlying failure and are surfaced with their
/// original message (internal tool).
#[derive(Debug, Error)]
pub enum CoreError {
    /// One or more form fields failed validation
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),

    /// Unique constraint would be violated
    #[error("{0}")]
    Duplicate(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Row is referenced elsewhere or otherwise locked
    #[error("{0}")]
    Conflict(String),

    /// Operation not allowed from the current lifecycle state
    #[error("{0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Security error: {0}")]
    Security(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(vec![message.into()])
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_joins_all_errors() {
        let err = CoreError::Validation(vec![
            "Individual ID is required".to_string(),
            "Age is required".to_string(),
        ]);
        assert_eq!(err.to_string(), "Individual ID is required; Age is required");
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(CoreError::NotFound("Analysis").to_string(), "Analysis not found");
    }
}
