//! Error types for media operations.

use thiserror::Error;
use vfx_models::ModelError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("{stage} failed (exit code {exit_code:?}): {message}")]
    WorkerFailed {
        stage: String,
        exit_code: Option<i32>,
        message: String,
    },

    #[error("Failed to decode {subject}: {message}")]
    Decode { subject: String, message: String },

    #[error("Invalid animation: {0}")]
    InvalidAnimation(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Worker {0} has been terminated")]
    WorkerTerminated(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image encoding failed: {0}")]
    ImageEncode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a worker failure error from an exit status and its log tail.
    pub fn worker_failed(stage: impl Into<String>, exit_code: Option<i32>, message: impl Into<String>) -> Self {
        Self::WorkerFailed {
            stage: stage.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// Create a decode error for a named subject.
    pub fn decode(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Create an invalid animation error.
    pub fn invalid_animation(message: impl Into<String>) -> Self {
        Self::InvalidAnimation(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error is the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ModelError> for MediaError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Validation(msg) => Self::Validation(msg),
            ModelError::InvalidAnimation(msg) => Self::InvalidAnimation(msg),
            ModelError::Decode { subject, message } => Self::Decode { subject, message },
        }
    }
}
