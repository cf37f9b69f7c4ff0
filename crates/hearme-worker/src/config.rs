//! Worker configuration.

use std::path::PathBuf;

use crate::error::{WorkerError, WorkerResult};

/// Frames buffered per live evaluation.
pub const DEFAULT_BATCH_SIZE: usize = 60;

/// Capture payloads used by a one-shot evaluation.
pub const DEFAULT_CAPTURE_FRAME_LIMIT: usize = 60;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Lesson catalog JSON
    pub catalog_path: PathBuf,
    /// Buffered frames that trigger one live evaluation
    pub batch_size: usize,
    /// Maximum capture payloads read by a one-shot evaluation
    pub capture_frame_limit: usize,
    /// Reference videos processed in parallel by the cache run
    pub max_concurrent_videos: usize,
    /// Pose-estimation engine model
    pub pose_model: PathBuf,
    /// Optional newline-separated list restricting the cache run
    pub video_list: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("catalog.json"),
            batch_size: DEFAULT_BATCH_SIZE,
            capture_frame_limit: DEFAULT_CAPTURE_FRAME_LIMIT,
            max_concurrent_videos: 2,
            pose_model: PathBuf::from("models/holistic.onnx"),
            video_list: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            catalog_path: std::env::var("HEARME_CATALOG")
                .map(PathBuf::from)
                .unwrap_or(defaults.catalog_path),
            batch_size: std::env::var("HEARME_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            capture_frame_limit: std::env::var("HEARME_CAPTURE_FRAME_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.capture_frame_limit),
            max_concurrent_videos: std::env::var("HEARME_MAX_CONCURRENT_VIDEOS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_videos),
            pose_model: std::env::var("HEARME_POSE_MODEL")
                .map(PathBuf::from)
                .unwrap_or(defaults.pose_model),
            video_list: std::env::var("HEARME_VIDEO_LIST")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.batch_size == 0 {
            return Err(WorkerError::config_error("HEARME_BATCH_SIZE must be positive"));
        }
        if self.capture_frame_limit == 0 {
            return Err(WorkerError::config_error(
                "HEARME_CAPTURE_FRAME_LIMIT must be positive",
            ));
        }
        if self.max_concurrent_videos == 0 {
            return Err(WorkerError::config_error(
                "HEARME_MAX_CONCURRENT_VIDEOS must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WorkerConfig::default();
        assert_eq!(config.batch_size, 60);
        assert_eq!(config.capture_frame_limit, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = WorkerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WorkerError::ConfigError(_))
        ));
    }
}
