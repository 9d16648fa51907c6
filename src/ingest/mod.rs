//! Frame ingestion sources.
//!
//! This module provides the sources a camera pipeline can pull frames from:
//! - RTSP streams (IP cameras), real decode behind the `rtsp-gstreamer` feature
//! - Local still-image sequences (feature: `ingest-image`)
//! - Synthetic `stub://` sources (testing and demos)
//!
//! All sources implement [`FrameSource`] and produce [`Frame`] instances that
//! flow into the per-camera pipeline. Errors are classified so the pipeline
//! can pick the right recovery: retry the read, reopen the stream, or stop.

use thiserror::Error;

use crate::config::CameraConfig;
use crate::frame::Frame;

pub mod file;
#[cfg(feature = "ingest-image")]
pub(crate) mod image_seq;
pub mod rtsp;

pub use file::FileSource;
pub use rtsp::RtspSource;

/// Errors produced by frame sources.
///
/// The variants map to distinct pipeline reactions:
/// - `ConnectionFailed`: stream could not be opened; retry `connect` with backoff.
/// - `ReadFailed`: transient frame read error; retry `next_frame` with backoff,
///   reopen after repeated failures.
/// - `EndOfStream`: finite source exhausted; the pipeline ends cleanly.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open stream {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("failed to read frame from {url}: {reason}")]
    ReadFailed { url: String, reason: String },

    #[error("end of stream: {url}")]
    EndOfStream { url: String },
}

impl SourceError {
    /// True when the pipeline may keep the source and retry the read.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::ReadFailed { .. })
    }
}

/// Statistics reported by a source for health logging.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// A stream of frames from one camera.
///
/// Sources hold their network/file handle for the lifetime of the value and
/// release it on drop, so every pipeline exit path closes the stream.
pub trait FrameSource: Send + std::fmt::Debug {
    /// Open the underlying stream. Must be called before `next_frame`.
    fn connect(&mut self) -> Result<(), SourceError>;

    /// Capture the next frame, blocking up to the source's internal timeout.
    fn next_frame(&mut self) -> Result<Frame, SourceError>;

    /// True while the source believes the stream is alive.
    fn is_healthy(&self) -> bool;

    /// Frame statistics for periodic health logging.
    fn stats(&self) -> SourceStats;
}

/// Build a source for a configured camera, dispatching on the URL scheme.
///
/// `rtsp://` and `stub://` map to [`RtspSource`]; `file://` URLs, bare paths,
/// and authority-less `stub:` forms map to [`FileSource`].
pub fn open_source(camera: &CameraConfig) -> Result<Box<dyn FrameSource>, SourceError> {
    match url::Url::parse(&camera.url) {
        Ok(parsed) => match parsed.scheme() {
            // "stub:clip" (no authority) is the synthetic finite file source;
            // "stub://cam" is the synthetic live stream.
            "stub" if parsed.cannot_be_a_base() => Ok(Box::new(FileSource::new(
                camera.url.clone(),
                camera.target_fps,
            )?)),
            "rtsp" | "stub" => Ok(Box::new(RtspSource::new(camera.clone())?)),
            "file" => Ok(Box::new(FileSource::new(
                parsed.path().to_string(),
                camera.target_fps,
            )?)),
            other => Err(SourceError::ConnectionFailed {
                url: camera.url.clone(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        },
        // Not a URL: treat it as a local path.
        Err(_) => Ok(Box::new(FileSource::new(
            camera.url.clone(),
            camera.target_fps,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(url: &str) -> CameraConfig {
        CameraConfig {
            id: "cam-test".to_string(),
            url: url.to_string(),
            target_fps: 10,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn open_source_dispatches_stub_urls_to_rtsp() {
        let mut source = open_source(&camera("stub://front")).expect("stub source");
        source.connect().expect("connect");
        let frame = source.next_frame().expect("frame");
        assert_eq!(frame.width, 64);
    }

    #[test]
    fn open_source_dispatches_bare_stub_paths_to_file() {
        // "stub:clip" (no authority) is the finite synthetic file source,
        // unlike "stub://cam" which streams forever.
        let mut source = open_source(&camera("stub:clip")).expect("file source");
        source.connect().expect("connect");

        let mut frames = 0u32;
        let err = loop {
            match source.next_frame() {
                Ok(_) => frames += 1,
                Err(e) => break e,
            }
            assert!(frames < 1_000, "bare stub: path must be a finite source");
        };
        assert!(matches!(err, SourceError::EndOfStream { .. }));
        assert!(frames > 0);
    }

    #[test]
    fn open_source_rejects_unknown_schemes() {
        let err = open_source(&camera("gopher://nope")).unwrap_err();
        assert!(matches!(err, SourceError::ConnectionFailed { .. }));
    }

    #[test]
    fn read_failed_is_the_only_transient_error() {
        let read = SourceError::ReadFailed {
            url: "rtsp://cam".into(),
            reason: "timeout".into(),
        };
        let eos = SourceError::EndOfStream {
            url: "file:///clip".into(),
        };
        assert!(read.is_transient());
        assert!(!eos.is_transient());
    }
}
