//! Local file frame source.
//!
//! `FileSource` ingests frames from local still images: a single JPEG or a
//! directory of JPEGs played back as a sequence (feature: `ingest-image`).
//! Finite sources report `EndOfStream` once exhausted, which ends the
//! pipeline cleanly instead of triggering reconnects.

use crate::frame::{Frame, PixelFormat};

#[cfg(feature = "ingest-image")]
use super::image_seq::ImageSeqSource;
use super::{FrameSource, SourceError, SourceStats};

/// Frames produced by the synthetic file backend before EndOfStream.
const SYNTHETIC_FRAME_COUNT: u64 = 25;

/// Local file frame source.
#[derive(Debug)]
pub struct FileSource {
    backend: FileBackend,
}

#[derive(Debug)]
enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-image")]
    Image(ImageSeqSource),
}

impl FileSource {
    pub fn new(path: String, target_fps: u32) -> Result<Self, SourceError> {
        if !is_local_file_path(&path) {
            return Err(SourceError::ConnectionFailed {
                url: path,
                reason: "file ingestion only supports local paths (no URL schemes)".to_string(),
            });
        }
        if path.starts_with("stub:") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(path)),
            })
        } else {
            #[cfg(feature = "ingest-image")]
            {
                Ok(Self {
                    backend: FileBackend::Image(ImageSeqSource::new(path, target_fps)?),
                })
            }
            #[cfg(not(feature = "ingest-image"))]
            {
                let _ = target_fps;
                Err(SourceError::ConnectionFailed {
                    url: path,
                    reason: "file ingestion requires the ingest-image feature".to_string(),
                })
            }
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<(), SourceError> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-image")]
            FileBackend::Image(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-image")]
            FileBackend::Image(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-image")]
            FileBackend::Image(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-image")]
            FileBackend::Image(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub:) for tests
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct SyntheticFileSource {
    path: String,
    frame_count: u64,
}

impl SyntheticFileSource {
    fn new(path: String) -> Self {
        Self {
            path,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<(), SourceError> {
        log::info!("FileSource: connected to {} (synthetic)", self.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        if self.frame_count >= SYNTHETIC_FRAME_COUNT {
            return Err(SourceError::EndOfStream {
                url: self.path.clone(),
            });
        }
        self.frame_count += 1;

        let width = 64usize;
        let height = 48usize;
        let mut pixels = vec![0u8; width * height * 3];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 128) as u8;
        }
        Ok(Frame::new(pixels, 64, 48, PixelFormat::Rgb8))
    }

    fn is_healthy(&self) -> bool {
        self.frame_count < SYNTHETIC_FRAME_COUNT
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub:") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_file_source_ends_with_end_of_stream() {
        let mut source =
            FileSource::new("stub:clip".to_string(), 10).expect("source");
        source.connect().expect("connect");

        for _ in 0..SYNTHETIC_FRAME_COUNT {
            source.next_frame().expect("frame");
        }
        let err = source.next_frame().unwrap_err();
        assert!(matches!(err, SourceError::EndOfStream { .. }));
    }

    #[test]
    fn url_schemes_are_rejected() {
        let err =
            FileSource::new("https://example.com/clip.mp4".to_string(), 10).unwrap_err();
        assert!(matches!(err, SourceError::ConnectionFailed { .. }));
    }

    #[test]
    fn empty_path_is_rejected() {
        let err = FileSource::new("  ".to_string(), 10).unwrap_err();
        assert!(matches!(err, SourceError::ConnectionFailed { .. }));
    }
}
