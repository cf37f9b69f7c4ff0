//! Lesson completion records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{LessonId, UserId};

/// One learner's completion of one lesson.
///
/// Stores upsert on `(user_id, lesson_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressRecord {
    pub user_id: UserId,
    pub lesson_id: LessonId,
    pub completed: bool,
    pub completed_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Completed-now record.
    pub fn completed(user_id: UserId, lesson_id: LessonId) -> Self {
        Self {
            user_id,
            lesson_id,
            completed: true,
            completed_at: Utc::now(),
        }
    }

    /// Storage key for upserts.
    pub fn key(&self) -> (UserId, LessonId) {
        (self.user_id.clone(), self.lesson_id.clone())
    }
}
