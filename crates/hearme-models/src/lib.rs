//! Shared data models for the HearMe gesture pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - The fixed landmark frame layout shared by extraction, normalization and the model
//! - Embeddings, reference records and match verdicts
//! - Lesson catalog, collections and the learning roadmap
//! - Progress records written on a successful match

pub mod catalog;
pub mod embedding;
pub mod ids;
pub mod landmark;
pub mod progress;
pub mod verdict;

// Re-export common types
pub use catalog::{
    clean_label, embedding_file_name, video_stem, Catalog, EMBEDDING_FILE_SUFFIX, CatalogError, CatalogResult,
    CollectionConfig, LessonEntry, Roadmap, RoadmapLesson, TargetShape,
};
pub use embedding::{Embedding, ReferenceRecord, Threshold, ThresholdError};
pub use ids::{CollectionId, LessonId, SessionId, UserId};
pub use landmark::{
    Channel, HandSide, Landmark, LandmarkFrame, COORDS_PER_POINT, FACE_POINTS, FILTERED_FACE,
    FILTERED_POSE, HAND_POINTS, POSE_POINTS, SEQUENCE_FRAMES, TOTAL_POINTS,
};
pub use progress::ProgressRecord;
pub use verdict::{MatchStatus, Verdict};
