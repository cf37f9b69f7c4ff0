//! Worker error types.

use hearme_models::CatalogError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No lesson selected for session")]
    NoLessonSelected,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Storage error: {0}")]
    Storage(#[from] hearme_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] hearme_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Input rejected before it reached session state.
    pub fn is_input_rejection(&self) -> bool {
        matches!(self, WorkerError::Media(e) if e.is_input_rejection())
    }

    /// Engine or model load failure; fatal for work depending on it.
    pub fn is_resource_load_failure(&self) -> bool {
        matches!(self, WorkerError::Media(e) if e.is_resource_load_failure())
    }

    /// No cached reference for the requested lesson.
    pub fn is_missing_reference(&self) -> bool {
        matches!(
            self,
            WorkerError::Storage(hearme_storage::StorageError::MissingReference { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearme_media::MediaError;
    use hearme_models::{CollectionId, LessonId};
    use hearme_storage::StorageError;

    #[test]
    fn test_classification() {
        let err: WorkerError = MediaError::EmptyFrame.into();
        assert!(err.is_input_rejection());

        let err: WorkerError =
            MediaError::model_load(CollectionId::from("asl"), "/m/asl.onnx", "bad").into();
        assert!(err.is_resource_load_failure());
        assert!(err.to_string().contains("asl"));

        let err: WorkerError =
            StorageError::missing_reference(LessonId::from("7"), "/e/x_embedding.npy").into();
        assert!(err.is_missing_reference());
        assert!(!err.is_input_rejection());
    }
}
