//! Async driver for live practice sessions.
//!
//! [`SessionRunner`] holds the process-wide handles (pipeline, references,
//! progress sink). Each [`LiveSession`] owns one [`PracticeSession`]; nothing
//! mutable is shared between sessions.
//!
//! Frames of one session are processed one at a time in arrival order (the
//! intake lock). The state lock is only taken for short, synchronous state
//! transitions and is never held across extraction or inference, so a lesson
//! switch can land while a batch is being scored.

use std::sync::{Arc, Mutex, MutexGuard};

use hearme_media::{decode_capture_payload, GesturePipeline, RgbFrame};
use hearme_models::{LessonId, ProgressRecord, SessionId, UserId, Verdict};
use hearme_storage::{ProgressRecorder, ReferenceStore};
use serde::Serialize;
use tracing::{debug, info, warn, Instrument};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::SessionLogger;
use crate::metrics;
use crate::session::{
    Completion, DiscardReason, FrameOutcome, PendingEvaluation, PracticeSession, SessionState,
    SessionSummary,
};

/// Shared collaborators for all live sessions.
#[derive(Clone)]
pub struct SessionRunner {
    pipeline: GesturePipeline,
    references: ReferenceStore,
    progress: Arc<dyn ProgressRecorder>,
    batch_size: usize,
}

impl SessionRunner {
    pub fn new(
        pipeline: GesturePipeline,
        references: ReferenceStore,
        progress: Arc<dyn ProgressRecorder>,
        batch_size: usize,
    ) -> Self {
        Self {
            pipeline,
            references,
            progress,
            batch_size,
        }
    }

    /// Start a session. `user` is `None` for anonymous learners.
    pub fn open_session(&self, user: Option<UserId>) -> LiveSession {
        let id = SessionId::new();
        let logger = SessionLogger::new(&id, "practice");
        logger.log_start(if user.is_some() {
            "authenticated learner"
        } else {
            "anonymous learner"
        });

        LiveSession {
            runner: self.clone(),
            state: Mutex::new(PracticeSession::new(id, user, self.batch_size)),
            intake: tokio::sync::Mutex::new(()),
            logger,
        }
    }
}

/// What the caller shows after one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    /// Verdict of a batch completed by this frame.
    pub verdict: Option<Verdict>,
    /// Cumulative match flag for the current lesson.
    pub matched: bool,
    pub buffered: usize,
    /// A verdict was computed but the lesson changed before it landed.
    pub stale: bool,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub lesson: Option<LessonId>,
    pub matched: bool,
    pub buffered: usize,
}

/// One learner's live connection.
pub struct LiveSession {
    runner: SessionRunner,
    state: Mutex<PracticeSession>,
    intake: tokio::sync::Mutex<()>,
    logger: SessionLogger,
}

impl LiveSession {
    pub fn id(&self) -> WorkerResult<SessionId> {
        Ok(self.lock_state()?.id().clone())
    }

    pub fn snapshot(&self) -> WorkerResult<SessionSnapshot> {
        let state = self.lock_state()?;
        Ok(SessionSnapshot {
            state: state.state(),
            lesson: state.lesson().cloned(),
            matched: state.matched(),
            buffered: state.buffered(),
        })
    }

    /// Make `lesson` the active lesson.
    ///
    /// Fails without touching the session when the reference artifact is
    /// missing or the collection's model cannot be loaded. A model that
    /// failed earlier is reloaded once here.
    pub async fn select_lesson(&self, lesson: &LessonId) -> WorkerResult<()> {
        let reference = Arc::new(self.runner.references.load(lesson).await?);

        let models = self.runner.pipeline.models();
        if models.get(&reference.collection_id).await.is_err() {
            models.reload(&reference.collection_id)?;
            models.get(&reference.collection_id).await?;
        }

        self.lock_state()?.switch_lesson(reference);
        self.logger.log_progress(&format!("lesson switched to {}", lesson));
        Ok(())
    }

    /// Decode and process one base64 capture payload.
    pub async fn push_capture(&self, payload: &str) -> WorkerResult<FrameReport> {
        let frame = decode_capture_payload(payload)?;
        self.push_frame(frame).await
    }

    /// Process one decoded frame.
    ///
    /// Rejected or unextractable frames return an error and leave the buffer
    /// unchanged.
    pub async fn push_frame(&self, frame: RgbFrame) -> WorkerResult<FrameReport> {
        let _intake = self.intake.lock().await;

        let landmarks = self.runner.pipeline.extract(frame).await?;

        let outcome = self.lock_state()?.push_frame(landmarks);
        let pending = match outcome {
            FrameOutcome::Evaluate(pending) => pending,
            FrameOutcome::Buffered { .. } => return self.report(None, false),
            FrameOutcome::Discarded(DiscardReason::AlreadyMatched) => {
                return self.report(None, false)
            }
            FrameOutcome::Discarded(DiscardReason::BufferFull) => {
                debug!("Batch already queued, frame dropped");
                return self.report(None, false);
            }
            FrameOutcome::Discarded(DiscardReason::NoLesson) => {
                return Err(WorkerError::NoLessonSelected)
            }
        };

        self.evaluate(pending)
            .instrument(self.logger.create_span())
            .await
    }

    /// End the session. A partial batch is discarded, not evaluated.
    pub fn finish(self) -> WorkerResult<SessionSummary> {
        let state = self
            .state
            .into_inner()
            .map_err(|_| WorkerError::internal("Session state lock poisoned"))?;
        let summary = state.finish();

        self.logger.log_completion(&format!(
            "matched={} evaluations={} discarded_frames={}",
            summary.matched, summary.evaluations, summary.discarded_frames
        ));
        Ok(summary)
    }

    async fn evaluate(&self, mut pending: PendingEvaluation) -> WorkerResult<FrameReport> {
        loop {
            let frames = std::mem::take(&mut pending.frames);
            let verdict = match self
                .runner
                .pipeline
                .evaluate(&pending.reference, frames)
                .await
            {
                Ok(verdict) => verdict,
                Err(e) => {
                    self.lock_state()?.abort(&pending.ticket);
                    self.logger.log_error(&format!("evaluation failed: {}", e));
                    return Err(e.into());
                }
            };

            info!(
                lesson = %pending.ticket.lesson(),
                similarity = verdict.similarity,
                status = %verdict.status,
                "Batch evaluated"
            );

            let completion = self.lock_state()?.complete(&pending.ticket, verdict);
            match completion {
                Completion::Matched { progress } => {
                    if let Some((user, lesson)) = progress {
                        record_progress(self.runner.progress.as_ref(), user, lesson).await;
                    } else {
                        debug!(lesson = %pending.ticket.lesson(), "Anonymous match, progress not recorded");
                    }
                    return self.report(Some(verdict), false);
                }
                Completion::NoMatch { next: Some(next) } => pending = next,
                Completion::NoMatch { next: None } => return self.report(Some(verdict), false),
                Completion::Stale => {
                    metrics::record_stale_evaluation();
                    debug!(lesson = %pending.ticket.lesson(), "Discarded stale evaluation");
                    return self.report(None, true);
                }
            }
        }
    }

    fn report(&self, verdict: Option<Verdict>, stale: bool) -> WorkerResult<FrameReport> {
        let state = self.lock_state()?;
        Ok(FrameReport {
            verdict,
            matched: state.matched(),
            buffered: state.buffered(),
            stale,
        })
    }

    fn lock_state(&self) -> WorkerResult<MutexGuard<'_, PracticeSession>> {
        self.state
            .lock()
            .map_err(|_| WorkerError::internal("Session state lock poisoned"))
    }
}

/// Upsert a completion. Failures are logged and swallowed.
pub(crate) async fn record_progress(progress: &dyn ProgressRecorder, user: UserId, lesson: LessonId) {
    let record = ProgressRecord::completed(user.clone(), lesson.clone());
    match progress.record_completion(record).await {
        Ok(()) => info!(user = %user, lesson = %lesson, "Lesson completion recorded"),
        Err(e) => {
            metrics::record_progress_failure();
            warn!(user = %user, lesson = %lesson, error = %e, "Failed to record lesson completion");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use hearme_media::{
        EmbeddingModel, MediaError, MediaResult, ModelLoader, ModelRegistry, PoseDetections,
        PoseEngine, SequenceTensor,
    };
    use hearme_models::{Catalog, CollectionConfig, Embedding, MatchStatus};
    use hearme_storage::{store_embedding, InMemoryProgressStore, StorageError, StorageResult};
    use std::path::Path;
    use tempfile::TempDir;

    pub(crate) struct BlankEngine;

    impl PoseEngine for BlankEngine {
        fn detect(&self, _frame: &RgbFrame) -> MediaResult<PoseDetections> {
            Ok(PoseDetections::default())
        }
    }

    /// Every sequence embeds to the same vector.
    pub(crate) struct FixedModel(pub Vec<f32>);

    impl EmbeddingModel for FixedModel {
        fn embed(&self, _sequence: &SequenceTensor) -> MediaResult<Embedding> {
            Ok(Embedding::new(self.0.clone()))
        }
    }

    /// Signals when `embed` starts, then blocks until released.
    struct GatedModel {
        embedding: Vec<f32>,
        started: tokio::sync::Notify,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl EmbeddingModel for GatedModel {
        fn embed(&self, _sequence: &SequenceTensor) -> MediaResult<Embedding> {
            self.started.notify_one();
            self.release.lock().unwrap().recv().unwrap();
            Ok(Embedding::new(self.embedding.clone()))
        }
    }

    pub(crate) struct FailingRecorder;

    #[async_trait]
    impl ProgressRecorder for FailingRecorder {
        async fn record_completion(&self, _record: ProgressRecord) -> StorageResult<()> {
            Err(StorageError::progress_write("database unavailable"))
        }

        async fn completed_lessons(&self, _user: &UserId) -> StorageResult<Vec<LessonId>> {
            Ok(Vec::new())
        }
    }

    /// Catalog with lessons "hello" (reference [1, 0]) and "goodbye"
    /// (reference [0, 1]); "missing" has no artifact.
    pub(crate) async fn fixture(dir: &Path) -> Arc<Catalog> {
        let json = serde_json::json!({
            "collections": [{
                "id": "asl",
                "name": "ASL",
                "model_file": dir.join("asl.onnx"),
                "video_dir": dir.join("asl_videos"),
                "embedding_dir": dir.join("asl_embeddings"),
                "threshold": 0.5
            }],
            "lessons": [
                {"id": "hello", "collection_id": "asl", "chapter": "Greetings", "video_filename": "01-Greetings-Hello.mp4"},
                {"id": "goodbye", "collection_id": "asl", "chapter": "Greetings", "video_filename": "02-Greetings-Goodbye.mp4"},
                {"id": "missing", "collection_id": "asl", "chapter": "Greetings", "video_filename": "03-Greetings-Thanks.mp4"}
            ]
        });
        let catalog = Catalog::from_json_str(&json.to_string()).unwrap();

        let embeddings = dir.join("asl_embeddings");
        store_embedding(
            &embeddings.join("01-Greetings-Hello_embedding.npy"),
            &Embedding::new(vec![1.0, 0.0]),
        )
        .await
        .unwrap();
        store_embedding(
            &embeddings.join("02-Greetings-Goodbye_embedding.npy"),
            &Embedding::new(vec![0.0, 1.0]),
        )
        .await
        .unwrap();

        Arc::new(catalog)
    }

    pub(crate) fn pipeline(catalog: &Catalog, loader: ModelLoader) -> GesturePipeline {
        let models = ModelRegistry::new(catalog.collections.clone(), loader).unwrap();
        GesturePipeline::new(Arc::new(BlankEngine), Arc::new(models))
    }

    pub(crate) fn fixed_loader(values: Vec<f32>) -> ModelLoader {
        Arc::new(move |_: &CollectionConfig| {
            Ok(Arc::new(FixedModel(values.clone())) as Arc<dyn EmbeddingModel>)
        })
    }

    fn frame() -> RgbFrame {
        RgbFrame::new(2, 2, vec![0; 12]).unwrap()
    }

    async fn runner(
        dir: &TempDir,
        embedding: Vec<f32>,
        progress: Arc<dyn ProgressRecorder>,
    ) -> SessionRunner {
        let catalog = fixture(dir.path()).await;
        SessionRunner::new(
            pipeline(&catalog, fixed_loader(embedding)),
            ReferenceStore::new(catalog),
            progress,
            60,
        )
    }

    async fn push_n(session: &LiveSession, n: usize) -> Vec<FrameReport> {
        let mut reports = Vec::new();
        for _ in 0..n {
            reports.push(session.push_frame(frame()).await.unwrap());
        }
        reports
    }

    #[tokio::test]
    async fn test_match_records_progress_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryProgressStore::new());
        let runner = runner(&dir, vec![0.9, 0.1], store.clone()).await;

        let session = runner.open_session(Some(UserId::from("u1")));
        session.select_lesson(&LessonId::from("hello")).await.unwrap();

        let reports = push_n(&session, 59).await;
        assert!(reports.iter().all(|r| r.verdict.is_none() && !r.matched));

        let report = session.push_frame(frame()).await.unwrap();
        let verdict = report.verdict.unwrap();
        assert_eq!(verdict.status, MatchStatus::Match);
        assert!(report.matched);

        let reports = push_n(&session, 120).await;
        assert!(reports.iter().all(|r| r.matched && r.verdict.is_none()));

        assert_eq!(
            store.completed_lessons(&UserId::from("u1")).await.unwrap(),
            vec![LessonId::from("hello")]
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_no_match_flushes_and_keeps_buffering() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryProgressStore::new());
        let runner = runner(&dir, vec![0.1, 0.9], store.clone()).await;

        let session = runner.open_session(Some(UserId::from("u1")));
        session.select_lesson(&LessonId::from("hello")).await.unwrap();

        let reports = push_n(&session, 60).await;
        let last = reports.last().unwrap();
        assert_eq!(last.verdict.unwrap().status, MatchStatus::NotMatch);
        assert_eq!(last.buffered, 0);
        assert!(!last.matched);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_switch_uses_new_reference() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, vec![0.0, 1.0], Arc::new(InMemoryProgressStore::new())).await;

        let session = runner.open_session(None);
        session.select_lesson(&LessonId::from("hello")).await.unwrap();
        push_n(&session, 30).await;

        session.select_lesson(&LessonId::from("goodbye")).await.unwrap();
        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.buffered, 0);
        assert!(!snapshot.matched);

        let reports = push_n(&session, 60).await;
        assert_eq!(
            reports.last().unwrap().verdict.unwrap().status,
            MatchStatus::Match
        );
    }

    #[tokio::test]
    async fn test_switch_during_evaluation_discards_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = fixture(dir.path()).await;
        let (release, gate) = std::sync::mpsc::channel();
        let model = Arc::new(GatedModel {
            embedding: vec![1.0, 0.0],
            started: tokio::sync::Notify::new(),
            release: Mutex::new(gate),
        });
        let shared = Arc::clone(&model);
        let loader: ModelLoader = Arc::new(move |_: &CollectionConfig| {
            Ok(Arc::clone(&shared) as Arc<dyn EmbeddingModel>)
        });
        let store = Arc::new(InMemoryProgressStore::new());
        let runner = SessionRunner::new(
            pipeline(&catalog, loader),
            ReferenceStore::new(catalog),
            store.clone(),
            60,
        );

        let session = Arc::new(runner.open_session(Some(UserId::from("u1"))));
        session.select_lesson(&LessonId::from("hello")).await.unwrap();
        push_n(&session, 59).await;

        let in_flight = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.push_frame(frame()).await })
        };
        model.started.notified().await;
        assert_eq!(session.snapshot().unwrap().state, SessionState::Evaluating);

        session.select_lesson(&LessonId::from("goodbye")).await.unwrap();
        release.send(()).unwrap();

        let report = in_flight.await.unwrap().unwrap();
        assert!(report.stale);
        assert!(report.verdict.is_none());
        assert!(!report.matched);

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.lesson, Some(LessonId::from("goodbye")));
        assert!(!snapshot.matched);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_progress_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, vec![1.0, 0.0], Arc::new(FailingRecorder)).await;

        let session = runner.open_session(Some(UserId::from("u1")));
        session.select_lesson(&LessonId::from("hello")).await.unwrap();

        let reports = push_n(&session, 60).await;
        assert!(reports.last().unwrap().matched);
    }

    #[tokio::test]
    async fn test_missing_reference_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, vec![1.0, 0.0], Arc::new(InMemoryProgressStore::new())).await;

        let session = runner.open_session(None);
        let err = session
            .select_lesson(&LessonId::from("missing"))
            .await
            .err()
            .unwrap();
        assert!(err.is_missing_reference());
        assert_eq!(session.snapshot().unwrap().lesson, None);
    }

    #[tokio::test]
    async fn test_frames_require_lesson() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, vec![1.0, 0.0], Arc::new(InMemoryProgressStore::new())).await;

        let session = runner.open_session(None);
        assert!(matches!(
            session.push_frame(frame()).await,
            Err(WorkerError::NoLessonSelected)
        ));
    }

    #[tokio::test]
    async fn test_malformed_capture_does_not_advance() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, vec![1.0, 0.0], Arc::new(InMemoryProgressStore::new())).await;

        let session = runner.open_session(None);
        session.select_lesson(&LessonId::from("hello")).await.unwrap();
        push_n(&session, 5).await;

        let err = session
            .push_capture("data:image/jpeg;base64,@@@")
            .await
            .err()
            .unwrap();
        assert!(err.is_input_rejection());
        assert_eq!(session.snapshot().unwrap().buffered, 5);
    }

    #[tokio::test]
    async fn test_model_load_failure_names_collection() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = fixture(dir.path()).await;
        let loader: ModelLoader = Arc::new(|config: &CollectionConfig| {
            Err(MediaError::model_load(
                config.id.clone(),
                &config.model_file,
                "missing weights",
            ))
        });
        let runner = SessionRunner::new(
            pipeline(&catalog, loader),
            ReferenceStore::new(catalog),
            Arc::new(InMemoryProgressStore::new()),
            60,
        );

        let session = runner.open_session(None);
        let err = session
            .select_lesson(&LessonId::from("hello"))
            .await
            .err()
            .unwrap();
        assert!(err.is_resource_load_failure());
        assert!(err.to_string().contains("asl"));
    }

    #[tokio::test]
    async fn test_finish_discards_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, vec![1.0, 0.0], Arc::new(InMemoryProgressStore::new())).await;

        let session = runner.open_session(None);
        session.select_lesson(&LessonId::from("hello")).await.unwrap();
        push_n(&session, 25).await;

        let summary = session.finish().unwrap();
        assert_eq!(summary.discarded_frames, 25);
        assert_eq!(summary.evaluations, 0);
    }
}
