//! One-shot evaluation of a recorded capture.
//!
//! The caller submits a finite list of base64 frames for one lesson. Only
//! the first `frame_limit` frames are used. The whole list is decoded
//! before any inference runs, so one malformed payload rejects the request.

use std::sync::Arc;

use hearme_media::{decode_capture_payload, GesturePipeline};
use hearme_models::{LessonId, ReferenceRecord, UserId, Verdict};
use hearme_storage::{ProgressRecorder, ReferenceStore};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::WorkerResult;
use crate::runner::record_progress;

/// Which lesson a capture is scored against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonSelector {
    Id(LessonId),
    /// Public reference video path, e.g. `/Family_video2/01-Family-Mother.mp4`.
    PublicPath(String),
}

/// Scored capture.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub lesson_id: LessonId,
    #[serde(flatten)]
    pub verdict: Verdict,
    pub frames_used: usize,
}

/// Scores recorded captures against lesson references.
#[derive(Clone)]
pub struct CaptureEvaluator {
    pipeline: GesturePipeline,
    references: ReferenceStore,
    progress: Arc<dyn ProgressRecorder>,
    frame_limit: usize,
}

impl CaptureEvaluator {
    pub fn new(
        pipeline: GesturePipeline,
        references: ReferenceStore,
        progress: Arc<dyn ProgressRecorder>,
        frame_limit: usize,
    ) -> Self {
        Self {
            pipeline,
            references,
            progress,
            frame_limit,
        }
    }

    /// Score `payloads` against the selected lesson.
    ///
    /// An empty capture is still embedded and scored. On a match with a
    /// known user, completion is recorded; recording failures never fail
    /// the evaluation.
    pub async fn evaluate(
        &self,
        lesson: &LessonSelector,
        user: Option<&UserId>,
        payloads: &[String],
    ) -> WorkerResult<CaptureResult> {
        let reference = self.resolve(lesson).await?;

        let frames = payloads
            .iter()
            .take(self.frame_limit)
            .map(|p| decode_capture_payload(p))
            .collect::<Result<Vec<_>, _>>()?;

        let mut landmarks = Vec::with_capacity(frames.len());
        for frame in frames {
            landmarks.push(self.pipeline.extract(frame).await?);
        }
        let frames_used = landmarks.len();

        let verdict = self.pipeline.evaluate(&reference, landmarks).await?;
        info!(
            lesson = %reference.lesson_id,
            frames = frames_used,
            similarity = verdict.similarity,
            status = %verdict.status,
            "Capture evaluated"
        );

        if verdict.is_match() {
            if let Some(user) = user {
                record_progress(
                    self.progress.as_ref(),
                    user.clone(),
                    reference.lesson_id.clone(),
                )
                .await;
            }
        }

        Ok(CaptureResult {
            lesson_id: reference.lesson_id,
            verdict,
            frames_used,
        })
    }

    async fn resolve(&self, lesson: &LessonSelector) -> WorkerResult<ReferenceRecord> {
        let reference = match lesson {
            LessonSelector::Id(id) => self.references.load(id).await?,
            LessonSelector::PublicPath(path) => self.references.load_by_public_path(path).await?,
        };
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::{fixed_loader, fixture, pipeline, FailingRecorder};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use hearme_models::MatchStatus;
    use hearme_storage::InMemoryProgressStore;
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn payload() -> String {
        let image = RgbImage::from_pixel(8, 8, Rgb([200, 180, 160]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageOutputFormat::Png).unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner()))
    }

    async fn evaluator(
        dir: &std::path::Path,
        embedding: Vec<f32>,
        progress: Arc<dyn ProgressRecorder>,
    ) -> CaptureEvaluator {
        let catalog = fixture(dir).await;
        CaptureEvaluator::new(
            pipeline(&catalog, fixed_loader(embedding)),
            ReferenceStore::new(catalog),
            progress,
            60,
        )
    }

    #[tokio::test]
    async fn test_match_records_progress() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryProgressStore::new());
        let evaluator = evaluator(dir.path(), vec![1.0, 0.1], store.clone()).await;

        let payloads = vec![payload(); 75];
        let result = evaluator
            .evaluate(
                &LessonSelector::Id(LessonId::from("hello")),
                Some(&UserId::from("u1")),
                &payloads,
            )
            .await
            .unwrap();

        assert_eq!(result.verdict.status, MatchStatus::Match);
        assert_eq!(result.frames_used, 60);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_by_public_path() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = evaluator(dir.path(), vec![0.0, 1.0], Arc::new(InMemoryProgressStore::new())).await;

        let result = evaluator
            .evaluate(
                &LessonSelector::PublicPath("/asl_videos/02-Greetings-Goodbye.mp4".to_string()),
                None,
                &[payload()],
            )
            .await
            .unwrap();
        assert_eq!(result.lesson_id.as_str(), "goodbye");
        assert!(result.verdict.is_match());
    }

    #[tokio::test]
    async fn test_no_match_skips_progress() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryProgressStore::new());
        let evaluator = evaluator(dir.path(), vec![0.0, 1.0], store.clone()).await;

        let result = evaluator
            .evaluate(
                &LessonSelector::Id(LessonId::from("hello")),
                Some(&UserId::from("u1")),
                &[payload(), payload()],
            )
            .await
            .unwrap();
        assert_eq!(result.verdict.status, MatchStatus::NotMatch);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_empty_capture_is_scored() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = evaluator(dir.path(), vec![1.0, 0.0], Arc::new(FailingRecorder)).await;

        let result = evaluator
            .evaluate(
                &LessonSelector::Id(LessonId::from("hello")),
                Some(&UserId::from("u1")),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(result.frames_used, 0);
        assert!(result.verdict.is_match());
    }

    #[tokio::test]
    async fn test_malformed_payload_rejects_request() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = evaluator(dir.path(), vec![1.0, 0.0], Arc::new(InMemoryProgressStore::new())).await;

        let err = evaluator
            .evaluate(
                &LessonSelector::Id(LessonId::from("hello")),
                None,
                &[payload(), "data:image/png;base64,????".to_string()],
            )
            .await
            .err()
            .unwrap();
        assert!(err.is_input_rejection());
    }

    #[tokio::test]
    async fn test_missing_reference() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = evaluator(dir.path(), vec![1.0, 0.0], Arc::new(InMemoryProgressStore::new())).await;

        let err = evaluator
            .evaluate(&LessonSelector::Id(LessonId::from("missing")), None, &[payload()])
            .await
            .err()
            .unwrap();
        assert!(err.is_missing_reference());
    }
}
