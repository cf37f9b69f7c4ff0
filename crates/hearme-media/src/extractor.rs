//! Landmark extraction into the fixed frame layout.

use std::sync::Arc;
use std::time::Instant;

use hearme_models::{
    Channel, HandSide, Landmark, LandmarkFrame, FILTERED_FACE, FILTERED_POSE, HAND_POINTS,
};
use tracing::trace;

use crate::engine::{PoseDetections, PoseEngine};
use crate::error::{MediaError, MediaResult};
use crate::frame::RgbFrame;
use crate::metrics;

/// Turns decoded frames into [`LandmarkFrame`]s using a shared engine.
#[derive(Clone)]
pub struct LandmarkExtractor {
    engine: Arc<dyn PoseEngine>,
}

impl LandmarkExtractor {
    pub fn new(engine: Arc<dyn PoseEngine>) -> Self {
        Self { engine }
    }

    /// Extract one frame. Blocking; call from a blocking context.
    pub fn extract(&self, frame: &RgbFrame) -> MediaResult<LandmarkFrame> {
        let start = Instant::now();
        let detections = self.engine.detect(frame)?;
        let assembled = assemble_frame(&detections)?;
        metrics::record_extraction(start.elapsed().as_secs_f64());

        trace!(
            hands = detections.hands.len(),
            pose = detections.pose.is_some(),
            face = detections.face.is_some(),
            "Extracted landmark frame"
        );

        Ok(assembled)
    }
}

/// Build the fixed-layout frame from raw detections.
///
/// Missing regions stay zero. Only the first hand per side is kept, so a
/// second same-side detection never overwrites the first. Detections that
/// violate the engine's point-count contract are errors.
pub fn assemble_frame(detections: &PoseDetections) -> MediaResult<LandmarkFrame> {
    let mut frame = LandmarkFrame::zeroed();

    let mut primary_filled = false;
    let mut secondary_filled = false;
    for hand in &detections.hands {
        let filled = match hand.side {
            HandSide::Primary => &mut primary_filled,
            HandSide::Secondary => &mut secondary_filled,
        };
        if *filled {
            continue;
        }
        if hand.landmarks.len() != HAND_POINTS {
            return Err(MediaError::detection_failed(format!(
                "Hand detection has {} points, expected {}",
                hand.landmarks.len(),
                HAND_POINTS
            )));
        }
        frame.fill_channel(hand.side.channel(), &hand.landmarks);
        *filled = true;
    }

    if let Some(pose) = &detections.pose {
        let selected = select(pose, &FILTERED_POSE, Channel::Pose)?;
        frame.fill_channel(Channel::Pose, &selected);
    }

    if let Some(face) = &detections.face {
        let selected = select(face, &FILTERED_FACE, Channel::Face)?;
        frame.fill_channel(Channel::Face, &selected);
    }

    Ok(frame)
}

fn select(points: &[Landmark], indices: &[usize], channel: Channel) -> MediaResult<Vec<Landmark>> {
    indices
        .iter()
        .map(|&i| {
            points.get(i).copied().ok_or_else(|| {
                MediaError::detection_failed(format!(
                    "{} detection has {} points, index {} required",
                    channel,
                    points.len(),
                    i
                ))
            })
        })
        .collect()
}
