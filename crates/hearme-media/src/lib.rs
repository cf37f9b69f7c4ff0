#![deny(unreachable_patterns)]
//! Gesture similarity pipeline.
//!
//! This crate provides:
//! - Frame decoding for live capture payloads and reference videos (FFmpeg)
//! - Landmark extraction into the fixed 100-point frame layout
//! - Sequence normalization into the model's `(1, T, 100, 3)` input tensor
//! - Embedding generation through per-collection ONNX models
//! - Cosine-similarity match decisions
//! - An async pipeline that keeps the blocking inference calls off the runtime

pub mod capture;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod frame;
pub mod metrics;
pub mod normalizer;
pub mod ort_engine;
pub mod pipeline;
pub mod probe;
pub mod similarity;
pub mod video;

pub use capture::decode_capture_payload;
pub use embedding::{EmbeddingModel, ModelLoader, ModelRegistry, OrtEmbeddingModel};
pub use engine::{HandDetection, PoseDetections, PoseEngine};
pub use error::{MediaError, MediaResult};
pub use extractor::{assemble_frame, LandmarkExtractor};
pub use frame::RgbFrame;
pub use normalizer::{normalize_sequence, SequenceTensor};
pub use ort_engine::OrtPoseEngine;
pub use pipeline::GesturePipeline;
pub use probe::{probe_video, VideoInfo};
pub use similarity::{compare, cosine_similarity, decide};
pub use video::VideoFrameReader;
