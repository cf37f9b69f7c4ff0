//! Practice sessions and the reference embedding cache.
//!
//! This crate provides:
//! - The practice session state machine and its async runner
//! - One-shot evaluation of recorded captures
//! - The offline reference embedding build
//! - Worker configuration, logging and metrics

pub mod capture_eval;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod reference_cache;
pub mod runner;
pub mod session;

pub use capture_eval::{CaptureEvaluator, CaptureResult, LessonSelector};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::{init_tracing, SessionLogger};
pub use reference_cache::{
    plan_jobs, read_video_list, unknown_video_reports, CacheJob, CacheOutcome, CacheReport,
    CacheSummary, ReferenceCacheBuilder, VideoLandmarkSource,
};
pub use runner::{FrameReport, LiveSession, SessionRunner, SessionSnapshot};
pub use session::{PracticeSession, SessionState, SessionSummary};
