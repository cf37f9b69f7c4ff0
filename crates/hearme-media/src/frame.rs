//! Decoded RGB frames.

use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::{MediaError, MediaResult};

/// One decoded color frame, `height x width x 3`, RGB byte order.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbFrame {
    /// Wrap raw RGB24 bytes.
    ///
    /// Zero-sized frames are rejected as [`MediaError::EmptyFrame`]; a buffer
    /// whose length disagrees with the dimensions is [`MediaError::InvalidFrame`].
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> MediaResult<Self> {
        if width == 0 || height == 0 || data.is_empty() {
            return Err(MediaError::EmptyFrame);
        }

        let expected_len = width as usize * height as usize * 3;
        if data.len() != expected_len {
            return Err(MediaError::InvalidFrame(format!(
                "Invalid image data length: expected {}, got {}",
                expected_len,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Borrow as an `image` buffer for resizing.
    pub fn to_image(&self) -> MediaResult<RgbImage> {
        ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| MediaError::internal("Failed to create image buffer"))
    }
}

impl TryFrom<RgbImage> for RgbFrame {
    type Error = MediaError;

    fn try_from(image: RgbImage) -> MediaResult<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_frame() {
        assert!(matches!(
            RgbFrame::new(0, 0, Vec::new()),
            Err(MediaError::EmptyFrame)
        ));
        assert!(matches!(
            RgbFrame::new(4, 4, Vec::new()),
            Err(MediaError::EmptyFrame)
        ));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        assert!(matches!(
            RgbFrame::new(2, 2, vec![0; 11]),
            Err(MediaError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_image_round_trip() {
        let frame = RgbFrame::new(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let image = frame.to_image().unwrap();
        assert_eq!(image.get_pixel(1, 0).0, [4, 5, 6]);
    }
}
