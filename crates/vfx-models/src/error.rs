//! Error types for model validation.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating segments, transitions and timelines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid animation: {0}")]
    InvalidAnimation(String),

    #[error("Failed to decode {subject}: {message}")]
    Decode { subject: String, message: String },
}

impl ModelError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an invalid animation error.
    pub fn invalid_animation(message: impl Into<String>) -> Self {
        Self::InvalidAnimation(message.into())
    }

    /// Create a decode error for a named subject (segment, document).
    pub fn decode(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            subject: subject.into(),
            message: message.into(),
        }
    }
}
