//! Storage error types.

use std::path::PathBuf;

use hearme_models::{CatalogError, LessonId};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("No reference embedding for lesson {lesson} at {path}")]
    MissingReference { lesson: LessonId, path: PathBuf },

    #[error("Invalid embedding artifact {path}: {message}")]
    InvalidArtifact { path: PathBuf, message: String },

    #[error("Lesson not found: {0}")]
    LessonNotFound(LessonId),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Progress write failed: {0}")]
    ProgressWrite(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn missing_reference(lesson: LessonId, path: impl Into<PathBuf>) -> Self {
        Self::MissingReference {
            lesson,
            path: path.into(),
        }
    }

    pub fn invalid_artifact(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn progress_write(msg: impl Into<String>) -> Self {
        Self::ProgressWrite(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
