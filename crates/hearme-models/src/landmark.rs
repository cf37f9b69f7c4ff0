//! Fixed landmark frame layout.
//!
//! A [`LandmarkFrame`] is 100 three-dimensional points laid out in four
//! channel blocks, always in this order:
//!
//! | Channel    | Offset | Points | Source                                   |
//! |------------|--------|--------|------------------------------------------|
//! | Right hand | 0      | 21     | full hand skeleton                        |
//! | Left hand  | 21     | 21     | full hand skeleton                        |
//! | Pose       | 42     | 6      | shoulders, elbows, wrists ([`FILTERED_POSE`]) |
//! | Face       | 48     | 52     | brows, eyes, nose, lips, irises ([`FILTERED_FACE`]) |
//!
//! The layout is baked into the trained embedding models. Extraction,
//! normalization and inference all read these constants; none of them may
//! define their own.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Points per hand skeleton.
pub const HAND_POINTS: usize = 21;

/// Upper-body pose points kept from the full body skeleton.
pub const POSE_POINTS: usize = FILTERED_POSE.len();

/// Face points kept from the full face mesh.
pub const FACE_POINTS: usize = FILTERED_FACE.len();

/// Total points in one frame.
pub const TOTAL_POINTS: usize = HAND_POINTS * 2 + POSE_POINTS + FACE_POINTS;

/// Coordinates per point (x, y, z).
pub const COORDS_PER_POINT: usize = 3;

/// Frames per normalized sequence.
pub const SEQUENCE_FRAMES: usize = 120;

/// Indices into the 33-point body skeleton: shoulders, elbows, wrists.
pub const FILTERED_POSE: [usize; 6] = [11, 12, 13, 14, 15, 16];

/// Indices into the 478-point refined face mesh.
pub const FILTERED_FACE: [usize; 52] = [
    4, 6, 8, 9, 33, 37, 40, 46, 52, 55, 61, 70, 80, 82, 84, 87, 88, 91, 105, 107, 133, 145, 154,
    157, 159, 161, 163, 263, 267, 270, 276, 282, 285, 291, 300, 310, 312, 314, 317, 318, 321, 334,
    336, 362, 374, 381, 384, 386, 388, 390, 468, 473,
];

/// Single landmark, normalized to image-relative coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const ZERO: Landmark = Landmark {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

/// Which hand block a detected hand is written to.
///
/// Resolved once per detected hand from the detector's handedness
/// classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HandSide {
    /// Handedness class 0; written to the right-hand block.
    Primary,
    /// Any other handedness class; written to the left-hand block.
    Secondary,
}

impl HandSide {
    /// Map a raw handedness class index reported by a detector.
    pub fn from_class_index(index: i64) -> Self {
        if index == 0 {
            HandSide::Primary
        } else {
            HandSide::Secondary
        }
    }

    /// Channel block this side writes to.
    pub fn channel(&self) -> Channel {
        match self {
            HandSide::Primary => Channel::RightHand,
            HandSide::Secondary => Channel::LeftHand,
        }
    }
}

/// One of the four fixed landmark regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    RightHand,
    LeftHand,
    Pose,
    Face,
}

impl Channel {
    /// All channels in layout order.
    pub const ALL: &'static [Channel] = &[
        Channel::RightHand,
        Channel::LeftHand,
        Channel::Pose,
        Channel::Face,
    ];

    /// First point index of this channel within a frame.
    pub const fn offset(&self) -> usize {
        match self {
            Channel::RightHand => 0,
            Channel::LeftHand => HAND_POINTS,
            Channel::Pose => HAND_POINTS * 2,
            Channel::Face => HAND_POINTS * 2 + POSE_POINTS,
        }
    }

    /// Number of points in this channel.
    pub const fn len(&self) -> usize {
        match self {
            Channel::RightHand | Channel::LeftHand => HAND_POINTS,
            Channel::Pose => POSE_POINTS,
            Channel::Face => FACE_POINTS,
        }
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset()..self.offset() + self.len()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::RightHand => "right_hand",
            Channel::LeftHand => "left_hand",
            Channel::Pose => "pose",
            Channel::Face => "face",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One processed video frame: exactly [`TOTAL_POINTS`] landmarks.
///
/// Channels with no detection stay all-zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    points: Vec<Landmark>,
}

impl LandmarkFrame {
    /// Frame with every channel zero-filled.
    pub fn zeroed() -> Self {
        Self {
            points: vec![Landmark::ZERO; TOTAL_POINTS],
        }
    }

    /// Build a frame from a full point array.
    ///
    /// Returns `None` unless exactly [`TOTAL_POINTS`] points are given.
    pub fn from_points(points: Vec<Landmark>) -> Option<Self> {
        (points.len() == TOTAL_POINTS).then_some(Self { points })
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    /// Points of a single channel.
    pub fn channel(&self, channel: Channel) -> &[Landmark] {
        &self.points[channel.range()]
    }

    /// Overwrite one channel block.
    ///
    /// `points` shorter than the channel leave the tail untouched; extra
    /// points are ignored. Neighbouring channels are never written.
    pub fn fill_channel(&mut self, channel: Channel, points: &[Landmark]) {
        let block = &mut self.points[channel.range()];
        for (slot, point) in block.iter_mut().zip(points) {
            *slot = *point;
        }
    }

    /// True when no channel holds a non-zero point.
    pub fn is_empty_detection(&self) -> bool {
        self.points.iter().all(Landmark::is_zero)
    }

    /// True when the channel block is all zeros.
    pub fn channel_is_empty(&self, channel: Channel) -> bool {
        self.channel(channel).iter().all(Landmark::is_zero)
    }

    /// Flatten to `[x0, y0, z0, x1, ...]`, length `TOTAL_POINTS * COORDS_PER_POINT`.
    pub fn to_flat(&self) -> Vec<f32> {
        let mut flat = Vec::with_capacity(TOTAL_POINTS * COORDS_PER_POINT);
        self.write_flat(&mut flat);
        flat
    }

    /// Append the flattened coordinates to `out`.
    pub fn write_flat(&self, out: &mut Vec<f32>) {
        for p in &self.points {
            out.extend_from_slice(&[p.x, p.y, p.z]);
        }
    }
}

impl Default for LandmarkFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}
