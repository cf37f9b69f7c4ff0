//! Pose-estimation engine contract.
//!
//! The engine is an opaque keypoint detector for hands, body and face. It is
//! a process-wide resource that is not re-entrant: implementations serialize
//! calls internally (see [`crate::OrtPoseEngine`]), so a single instance can
//! be shared behind an `Arc` by every worker.

use hearme_models::{HandSide, Landmark};

use crate::error::MediaResult;
use crate::frame::RgbFrame;

/// Points the engine reports for a hand.
pub const ENGINE_HAND_POINTS: usize = 21;

/// Points the engine reports for the full body skeleton.
pub const ENGINE_POSE_POINTS: usize = 33;

/// Points the engine reports for the refined face mesh (with irises).
pub const ENGINE_FACE_POINTS: usize = 478;

/// One detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandDetection {
    pub side: HandSide,
    pub landmarks: Vec<Landmark>,
}

/// Raw engine output for one frame, in detection order.
///
/// `None` / empty means the region was not found in this frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseDetections {
    pub hands: Vec<HandDetection>,
    /// Full body skeleton, [`ENGINE_POSE_POINTS`] points.
    pub pose: Option<Vec<Landmark>>,
    /// First detected face, [`ENGINE_FACE_POINTS`] points.
    pub face: Option<Vec<Landmark>>,
}

/// Keypoint detector for hands, body pose and face.
pub trait PoseEngine: Send + Sync {
    /// Detect landmarks in one RGB frame.
    ///
    /// Absence of a region is not an error.
    fn detect(&self, frame: &RgbFrame) -> MediaResult<PoseDetections>;
}
