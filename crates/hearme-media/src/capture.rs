//! Live capture payload decoding.
//!
//! Browsers post frames as base64 data URLs
//! (`data:image/jpeg;base64,/9j/4AAQ...`). Everything up to the first comma
//! is a header and is discarded; bare base64 is accepted too.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{MediaError, MediaResult};
use crate::frame::RgbFrame;

/// Decode one base64 capture payload into an RGB frame.
pub fn decode_capture_payload(payload: &str) -> MediaResult<RgbFrame> {
    let encoded = match payload.split_once(',') {
        Some((_, body)) => body,
        None => payload,
    }
    .trim();

    if encoded.is_empty() {
        return Err(MediaError::malformed_capture("empty payload"));
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| MediaError::malformed_capture(format!("invalid base64: {e}")))?;

    let image = image::load_from_memory(&bytes)
        .map_err(|e| MediaError::malformed_capture(format!("undecodable image: {e}")))?;

    RgbFrame::try_from(image.to_rgb8())
}
