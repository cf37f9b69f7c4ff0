//! Lesson reference resolution.

use std::sync::Arc;

use hearme_models::{Catalog, LessonEntry, LessonId, ReferenceRecord};
use tracing::debug;

use crate::artifact::load_embedding;
use crate::error::{StorageError, StorageResult};

/// Resolves lessons to their cached reference embeddings.
#[derive(Clone)]
pub struct ReferenceStore {
    catalog: Arc<Catalog>,
}

impl ReferenceStore {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Load the reference for a lesson id.
    ///
    /// A lesson without a cached artifact is [`StorageError::MissingReference`].
    pub async fn load(&self, lesson_id: &LessonId) -> StorageResult<ReferenceRecord> {
        let lesson = self
            .catalog
            .lesson(lesson_id)
            .ok_or_else(|| StorageError::LessonNotFound(lesson_id.clone()))?;
        self.load_entry(lesson).await
    }

    /// Load the reference for a lesson addressed by its public video path.
    pub async fn load_by_public_path(&self, public_path: &str) -> StorageResult<ReferenceRecord> {
        let lesson = self
            .catalog
            .lesson_by_public_path(public_path)
            .ok_or_else(|| StorageError::LessonNotFound(LessonId::from(public_path)))?;
        self.load_entry(lesson).await
    }

    async fn load_entry(&self, lesson: &LessonEntry) -> StorageResult<ReferenceRecord> {
        let collection = self.catalog.lesson_collection(lesson)?;
        let threshold = collection.threshold()?;
        let path = self.catalog.embedding_path(lesson)?;

        let embedding = match load_embedding(&path).await {
            Ok(embedding) => embedding,
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::missing_reference(lesson.id.clone(), path));
            }
            Err(e) => return Err(e),
        };

        debug!(
            lesson = %lesson.id,
            collection = %collection.id,
            len = embedding.len(),
            "Loaded reference embedding"
        );

        Ok(ReferenceRecord::new(
            lesson.id.clone(),
            collection.id.clone(),
            embedding,
            threshold,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::store_embedding;
    use hearme_models::Embedding;
    use tempfile::tempdir;

    fn catalog(root: &std::path::Path) -> Catalog {
        let json = serde_json::json!({
            "collections": [{
                "id": "family",
                "name": "Family",
                "model_file": root.join("family.onnx"),
                "video_dir": root.join("Family_video2"),
                "embedding_dir": root.join("embeddings"),
                "threshold": 0.55
            }],
            "lessons": [
                {"id": "1", "collection_id": "family", "chapter": "Members", "video_filename": "01-Family-Mother 2.mp4"},
                {"id": "2", "collection_id": "family", "chapter": "Members", "video_filename": "02-Family-Father.mp4"}
            ]
        });
        Catalog::from_json_str(&json.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_loads_cached_reference() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(catalog(dir.path()));
        let path = dir.path().join("embeddings").join("01-Family-Mother 2_embedding.npy");
        store_embedding(&path, &Embedding::new(vec![0.1, 0.2]))
            .await
            .unwrap();

        let store = ReferenceStore::new(catalog);
        let record = store.load(&LessonId::from("1")).await.unwrap();
        assert_eq!(record.collection_id.as_str(), "family");
        assert_eq!(record.embedding.as_slice(), &[0.1, 0.2]);
        assert!((record.threshold.value() - 0.55).abs() < 1e-6);

        let by_path = store
            .load_by_public_path("/Family_video2/01-Family-Mother 2.mp4")
            .await
            .unwrap();
        assert_eq!(by_path.lesson_id, record.lesson_id);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_surfaced() {
        let dir = tempdir().unwrap();
        let store = ReferenceStore::new(Arc::new(catalog(dir.path())));

        match store.load(&LessonId::from("2")).await {
            Err(StorageError::MissingReference { lesson, path }) => {
                assert_eq!(lesson.as_str(), "2");
                assert!(path.ends_with("02-Family-Father_embedding.npy"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_lesson() {
        let dir = tempdir().unwrap();
        let store = ReferenceStore::new(Arc::new(catalog(dir.path())));
        assert!(matches!(
            store.load(&LessonId::from("99")).await,
            Err(StorageError::LessonNotFound(_))
        ));
    }
}
