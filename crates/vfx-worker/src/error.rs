//! Render error types.

use thiserror::Error;
use vfx_media::MediaError;
use vfx_models::ModelError;

pub type RenderResult<T> = Result<T, RenderError>;

/// Terminal outcome of a failed or cancelled render.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to decode {subject}: {message}")]
    Decode { subject: String, message: String },

    #[error("{stage} failed (exit code {exit_code:?}): {message}")]
    WorkerFailure {
        stage: String,
        exit_code: Option<i32>,
        message: String,
    },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Invalid animation: {0}")]
    InvalidAnimation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RenderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn decode(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn worker_failure(stage: impl Into<String>, exit_code: Option<i32>, message: impl Into<String>) -> Self {
        Self::WorkerFailure {
            stage: stage.into(),
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if the render was cancelled rather than failed.
    ///
    /// Callers use this to suppress user-facing error reporting.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Cancelled)
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::Validation(_) => "validation",
            RenderError::Decode { .. } => "decode",
            RenderError::WorkerFailure { .. } => "worker_failure",
            RenderError::Cancelled => "cancelled",
            RenderError::InvalidAnimation(_) => "invalid_animation",
            RenderError::Io(_) => "io",
            RenderError::Config(_) => "config",
        }
    }
}

impl From<ModelError> for RenderError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Validation(msg) => Self::Validation(msg),
            ModelError::InvalidAnimation(msg) => Self::InvalidAnimation(msg),
            ModelError::Decode { subject, message } => Self::Decode { subject, message },
        }
    }
}

impl From<MediaError> for RenderError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Cancelled => Self::Cancelled,
            MediaError::Validation(msg) => Self::Validation(msg),
            MediaError::InvalidAnimation(msg) => Self::InvalidAnimation(msg),
            MediaError::Decode { subject, message } => Self::Decode { subject, message },
            MediaError::WorkerFailed {
                stage,
                exit_code,
                message,
            } => Self::WorkerFailure {
                stage,
                exit_code,
                message,
            },
            MediaError::Io(e) => Self::Io(e),
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => Self::Config(err.to_string()),
            MediaError::WorkerTerminated(id) => Self::worker_failure("worker", None, format!("worker {id} terminated")),
            MediaError::JsonParse(e) => Self::InvalidAnimation(e.to_string()),
            MediaError::ImageEncode(msg) => Self::worker_failure("rasterize", None, msg),
            MediaError::Internal(msg) => Self::worker_failure("internal", None, msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_cancel_maps_to_cancelled() {
        let err: RenderError = MediaError::Cancelled.into();
        assert!(err.is_cancelled());
        assert_eq!(err.kind(), "cancelled");
    }

    #[test]
    fn test_worker_failure_keeps_stage_and_code() {
        let err: RenderError = MediaError::worker_failed("normalize", Some(1), "boom").into();
        match err {
            RenderError::WorkerFailure { stage, exit_code, .. } => {
                assert_eq!(stage, "normalize");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_model_errors_keep_their_kind() {
        let err: RenderError = ModelError::decode("segment 0", "no video stream").into();
        assert_eq!(err.kind(), "decode");
        assert!(err.to_string().contains("segment 0"));

        let err: RenderError = ModelError::validation("bad trim").into();
        assert!(matches!(err, RenderError::Validation(_)));
    }

    #[test]
    fn test_missing_binary_is_config_error() {
        let err: RenderError = MediaError::FfmpegNotFound.into();
        assert!(matches!(err, RenderError::Config(_)));
    }
}
