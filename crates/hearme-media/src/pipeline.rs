//! Async glue around the blocking extraction and inference stages.
//!
//! Extraction and embedding are CPU/GPU bound and serialized inside their
//! handles, so every call here is moved onto the blocking pool. Callers
//! never hold their own locks across these awaits.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use hearme_models::{CollectionId, Embedding, LandmarkFrame, ReferenceRecord, Verdict};
use tracing::debug;

use crate::embedding::ModelRegistry;
use crate::engine::PoseEngine;
use crate::error::{MediaError, MediaResult};
use crate::extractor::LandmarkExtractor;
use crate::frame::RgbFrame;
use crate::metrics;
use crate::normalizer::normalize_sequence;
use crate::similarity::compare;
use crate::video::VideoFrameReader;

/// Extraction, normalization, embedding and comparison.
#[derive(Clone)]
pub struct GesturePipeline {
    extractor: LandmarkExtractor,
    models: Arc<ModelRegistry>,
}

impl GesturePipeline {
    pub fn new(engine: Arc<dyn PoseEngine>, models: Arc<ModelRegistry>) -> Self {
        Self {
            extractor: LandmarkExtractor::new(engine),
            models,
        }
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    /// Extract landmarks from one frame.
    pub async fn extract(&self, frame: RgbFrame) -> MediaResult<LandmarkFrame> {
        let extractor = self.extractor.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&frame))
            .await
            .map_err(|e| MediaError::internal(format!("Extraction task failed: {e}")))?
    }

    /// Extract landmarks from every decodable frame of a video, in order.
    pub async fn extract_video(&self, path: &Path) -> MediaResult<Vec<LandmarkFrame>> {
        let mut reader = VideoFrameReader::open(path).await?;
        let mut frames = Vec::new();
        while let Some(frame) = reader.next_frame().await? {
            frames.push(self.extract(frame).await?);
        }

        debug!(
            path = %path.display(),
            frames = frames.len(),
            "Extracted reference video landmarks"
        );

        Ok(frames)
    }

    /// Normalize and embed a frame sequence with the collection's model.
    pub async fn embed(
        &self,
        collection: &CollectionId,
        frames: Vec<LandmarkFrame>,
    ) -> MediaResult<Embedding> {
        let target_frames = self.models.target_frames(collection)?;
        let model = self.models.get(collection).await?;
        let start = Instant::now();

        let embedding = tokio::task::spawn_blocking(move || {
            let tensor = normalize_sequence(&frames, target_frames)?;
            model.embed(&tensor)
        })
        .await
        .map_err(|e| MediaError::internal(format!("Embedding task failed: {e}")))??;

        metrics::record_embedding(collection.as_str(), start.elapsed().as_secs_f64());
        Ok(embedding)
    }

    /// Score a frame sequence against a lesson reference.
    pub async fn evaluate(
        &self,
        reference: &ReferenceRecord,
        frames: Vec<LandmarkFrame>,
    ) -> MediaResult<Verdict> {
        let frame_count = frames.len();
        let candidate = self.embed(&reference.collection_id, frames).await?;
        let verdict = compare(&candidate, &reference.embedding, reference.threshold)?;

        metrics::record_evaluation(
            reference.collection_id.as_str(),
            verdict.similarity,
            verdict.is_match(),
        );
        debug!(
            lesson = %reference.lesson_id,
            frames = frame_count,
            similarity = verdict.similarity,
            status = %verdict.status,
            "Evaluated sequence"
        );

        Ok(verdict)
    }
}
