//! Lesson progress stores.
//!
//! Completion is an upsert keyed by `(user, lesson)`: recording the same
//! lesson twice refreshes the timestamp and never creates a duplicate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hearme_models::{LessonId, ProgressRecord, UserId};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Sink for lesson completions.
#[async_trait]
pub trait ProgressRecorder: Send + Sync {
    /// Upsert a completion record.
    async fn record_completion(&self, record: ProgressRecord) -> StorageResult<()>;

    /// Lessons the user has completed, in lesson id order.
    async fn completed_lessons(&self, user: &UserId) -> StorageResult<Vec<LessonId>>;
}

type ProgressKey = (UserId, LessonId);

fn completed_for(
    records: &HashMap<ProgressKey, ProgressRecord>,
    user: &UserId,
) -> Vec<LessonId> {
    let mut lessons: Vec<LessonId> = records
        .values()
        .filter(|r| &r.user_id == user && r.completed)
        .map(|r| r.lesson_id.clone())
        .collect();
    lessons.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    lessons
}

/// Process-local progress store.
#[derive(Default)]
pub struct InMemoryProgressStore {
    records: RwLock<HashMap<ProgressKey, ProgressRecord>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user: &UserId, lesson: &LessonId) -> Option<ProgressRecord> {
        self.records
            .read()
            .await
            .get(&(user.clone(), lesson.clone()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ProgressRecorder for InMemoryProgressStore {
    async fn record_completion(&self, record: ProgressRecord) -> StorageResult<()> {
        self.records.write().await.insert(record.key(), record);
        Ok(())
    }

    async fn completed_lessons(&self, user: &UserId) -> StorageResult<Vec<LessonId>> {
        Ok(completed_for(&*self.records.read().await, user))
    }
}

/// Progress persisted as a JSON array of records in one file.
///
/// Writes go through a temporary sibling and a rename. One writer at a time
/// per store instance.
pub struct JsonFileProgressStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> StorageResult<HashMap<ProgressKey, ProgressRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let records: Vec<ProgressRecord> = serde_json::from_slice(&bytes)?;
        Ok(records.into_iter().map(|r| (r.key(), r)).collect())
    }

    async fn write_all(&self, records: &HashMap<ProgressKey, ProgressRecord>) -> StorageResult<()> {
        let mut sorted: Vec<&ProgressRecord> = records.values().collect();
        sorted.sort_by(|a, b| {
            (a.user_id.as_str(), a.lesson_id.as_str()).cmp(&(b.user_id.as_str(), b.lesson_id.as_str()))
        });
        let json = serde_json::to_vec_pretty(&sorted)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StorageError::progress_write(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::progress_write(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

#[async_trait]
impl ProgressRecorder for JsonFileProgressStore {
    async fn record_completion(&self, record: ProgressRecord) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;

        debug!(
            user = %record.user_id,
            lesson = %record.lesson_id,
            "Recording lesson completion"
        );

        records.insert(record.key(), record);
        self.write_all(&records).await
    }

    async fn completed_lessons(&self, user: &UserId) -> StorageResult<Vec<LessonId>> {
        let _guard = self.write_lock.lock().await;
        Ok(completed_for(&self.read_all().await?, user))
    }
}
