//! Embeddings and reference records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{CollectionId, LessonId};

/// Fixed-length motion embedding produced by a collection's model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Per-lesson minimum cosine similarity, strictly inside (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "f32", into = "f32")]
pub struct Threshold(f32);

impl Threshold {
    pub fn new(value: f32) -> Result<Self, ThresholdError> {
        if value > 0.0 && value < 1.0 {
            Ok(Self(value))
        } else {
            Err(ThresholdError(value))
        }
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl TryFrom<f32> for Threshold {
    type Error = ThresholdError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Threshold> for f32 {
    fn from(threshold: Threshold) -> Self {
        threshold.0
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
#[error("Threshold must lie strictly between 0 and 1, got {0}")]
pub struct ThresholdError(pub f32);

/// Cached reference for one lesson. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReferenceRecord {
    pub lesson_id: LessonId,
    /// Collection whose model produced the embedding.
    pub collection_id: CollectionId,
    pub embedding: Embedding,
    pub threshold: Threshold,
}

impl ReferenceRecord {
    pub fn new(
        lesson_id: LessonId,
        collection_id: CollectionId,
        embedding: Embedding,
        threshold: Threshold,
    ) -> Self {
        Self {
            lesson_id,
            collection_id,
            embedding,
            threshold,
        }
    }
}
