//! Sequence normalization to the embedding model's fixed input shape.

use hearme_models::{LandmarkFrame, COORDS_PER_POINT, TOTAL_POINTS};
use ndarray::{Array4, ArrayView4};

use crate::error::{MediaError, MediaResult};

/// Model input: a batch of one sequence, shape `(1, T, 100, 3)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceTensor {
    data: Array4<f32>,
}

impl SequenceTensor {
    /// Number of frames `T`.
    pub fn frames(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// Row-major contiguous values, for building runtime tensors.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// Pad or truncate `frames` to exactly `target_frames`.
///
/// Shorter sequences are zero-padded at the end; longer ones keep the first
/// `target_frames`. Frame order is preserved and nothing is rescaled.
pub fn normalize_sequence(
    frames: &[LandmarkFrame],
    target_frames: usize,
) -> MediaResult<SequenceTensor> {
    if target_frames == 0 {
        return Err(MediaError::internal("target frame count must be positive"));
    }

    let per_frame = TOTAL_POINTS * COORDS_PER_POINT;
    let mut flat = Vec::with_capacity(target_frames * per_frame);
    for frame in frames.iter().take(target_frames) {
        frame.write_flat(&mut flat);
    }
    flat.resize(target_frames * per_frame, 0.0);

    let data = Array4::from_shape_vec((1, target_frames, TOTAL_POINTS, COORDS_PER_POINT), flat)
        .map_err(|e| MediaError::internal(format!("Failed to shape sequence tensor: {e}")))?;

    Ok(SequenceTensor { data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearme_models::{Channel, Landmark};
    use ndarray::s;

    fn marked(value: f32) -> LandmarkFrame {
        let mut frame = LandmarkFrame::zeroed();
        frame.fill_channel(Channel::RightHand, &[Landmark::new(value, value, value)]);
        frame
    }

    #[test]
    fn test_pads_short_sequence_with_zeros() {
        let frames: Vec<_> = (1..=60).map(|i| marked(i as f32)).collect();
        let tensor = normalize_sequence(&frames, 120).unwrap();

        assert_eq!(tensor.shape(), [1, 120, 100, 3]);
        assert_eq!(tensor.view()[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor.view()[[0, 59, 0, 0]], 60.0);
        assert!(tensor
            .view()
            .slice(s![0, 60.., .., ..])
            .iter()
            .all(|&v| v == 0.0));
    }

    #[test]
    fn test_truncates_long_sequence_to_head() {
        let frames: Vec<_> = (1..=200).map(|i| marked(i as f32)).collect();
        let tensor = normalize_sequence(&frames, 120).unwrap();

        assert_eq!(tensor.frames(), 120);
        assert_eq!(tensor.view()[[0, 119, 0, 0]], 120.0);
    }

    #[test]
    fn test_exact_length_is_unchanged() {
        let frames: Vec<_> = (0..120).map(|i| marked(i as f32 * 0.01)).collect();
        let tensor = normalize_sequence(&frames, 120).unwrap();

        let expected: Vec<f32> = frames.iter().flat_map(|f| f.to_flat()).collect();
        assert_eq!(tensor.to_vec(), expected);
    }

    #[test]
    fn test_empty_sequence_is_all_zero() {
        let tensor = normalize_sequence(&[], 120).unwrap();
        assert!(tensor.view().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_zero_target_rejected() {
        assert!(normalize_sequence(&[marked(1.0)], 0).is_err());
    }
}
