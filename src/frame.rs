//! In-memory frame representation.
//!
//! A `Frame` is the unit of work flowing through a camera pipeline:
//! produced by an ingest source, consumed by the detector, mutated by the
//! overlay pass, and discarded at the end of the iteration. Frames are never
//! persisted or sent over the network.

use chrono::{DateTime, Utc};

/// Pixel layout of a frame buffer.
///
/// v1 sources all normalize to packed RGB; the enum exists so a future
/// grayscale or YUV path does not ripple through every signature.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit RGB, 3 bytes per pixel, row-major, no padding.
    #[default]
    Rgb8,
}

impl PixelFormat {
    /// Bytes per pixel for this format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// A decoded video frame plus its capture timestamp.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Create a frame from a packed pixel buffer. Called by ingest sources.
    ///
    /// The buffer length must be `width * height * bytes_per_pixel`; sources
    /// are responsible for stride normalization before construction.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * format.bytes_per_pixel(),
            "frame buffer length does not match dimensions"
        );
        Self {
            data,
            width,
            height,
            format,
            captured_at: Utc::now(),
        }
    }

    /// Read-only pixel access for detection.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel access for overlay drawing.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Raw byte length (for stats and memory accounting).
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_exposes_dimensions_and_pixels() {
        let data = vec![0u8; 4 * 2 * 3];
        let frame = Frame::new(data, 4, 2, PixelFormat::Rgb8);

        assert_eq!(frame.width, 4);
        assert_eq!(frame.height, 2);
        assert_eq!(frame.byte_len(), 24);
        assert_eq!(frame.pixels().len(), 24);
    }

    #[test]
    fn capture_timestamp_is_set_at_construction() {
        let before = Utc::now();
        let frame = Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Rgb8);
        let after = Utc::now();

        assert!(frame.captured_at >= before);
        assert!(frame.captured_at <= after);
    }
}
