//! Error types for media and inference operations.

use std::path::PathBuf;

use hearme_models::CollectionId;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur in the gesture pipeline.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Malformed capture payload: {0}")]
    MalformedCapture(String),

    #[error("Pose engine failed to load from {path}: {reason}")]
    EngineLoad { path: PathBuf, reason: String },

    #[error("Embedding model for collection {collection} failed to load from {path}: {reason}")]
    ModelLoad {
        collection: CollectionId,
        path: PathBuf,
        reason: String,
    },

    #[error("No embedding model configured for collection {0}")]
    UnknownCollection(CollectionId),

    #[error("Landmark detection failed: {0}")]
    DetectionFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Embedding length mismatch: candidate {candidate}, reference {reference}")]
    EmbeddingLengthMismatch { candidate: usize, reference: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create an inference failure error.
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::InferenceFailed(message.into())
    }

    /// Create a capture rejection.
    pub fn malformed_capture(message: impl Into<String>) -> Self {
        Self::MalformedCapture(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a pose engine load error.
    pub fn engine_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::EngineLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an embedding model load error.
    pub fn model_load(
        collection: CollectionId,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ModelLoad {
            collection,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Input rejected before it reached any state.
    pub fn is_input_rejection(&self) -> bool {
        matches!(
            self,
            MediaError::EmptyFrame | MediaError::InvalidFrame(_) | MediaError::MalformedCapture(_)
        )
    }

    /// A process-wide resource (engine or model) could not be loaded.
    pub fn is_resource_load_failure(&self) -> bool {
        matches!(
            self,
            MediaError::EngineLoad { .. } | MediaError::ModelLoad { .. }
        )
    }
}
