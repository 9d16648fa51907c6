//! RTSP frame source.
//!
//! `RtspSource` ingests frames from IP cameras via RTSP, decoding to packed
//! RGB. Real streams are handled by GStreamer behind the `rtsp-gstreamer`
//! feature; `stub://` URLs select a deterministic synthetic backend used by
//! tests and demos.

#[cfg(feature = "rtsp-gstreamer")]
use std::time::{Duration, Instant};

use crate::config::CameraConfig;
use crate::frame::{Frame, PixelFormat};

use super::{FrameSource, SourceError, SourceStats};

/// Frames per synthetic "visitor" cycle: a saturated block (a stand-in for a
/// face) appears for a short window once per cycle.
const SYNTHETIC_CYCLE_FRAMES: u64 = 50;
const SYNTHETIC_VISIT_FRAMES: u64 = 8;

/// RTSP frame source.
///
/// Uses GStreamer for real RTSP decode, with a synthetic fallback for
/// `stub://` URLs.
#[derive(Debug)]
pub struct RtspSource {
    backend: RtspBackend,
}

#[derive(Debug)]
enum RtspBackend {
    Synthetic(SyntheticRtspSource),
    #[cfg(feature = "rtsp-gstreamer")]
    Gstreamer(GstreamerRtspSource),
}

impl RtspSource {
    pub fn new(camera: CameraConfig) -> Result<Self, SourceError> {
        if camera.url.starts_with("stub://") {
            Ok(Self {
                backend: RtspBackend::Synthetic(SyntheticRtspSource::new(camera)),
            })
        } else {
            #[cfg(feature = "rtsp-gstreamer")]
            {
                Ok(Self {
                    backend: RtspBackend::Gstreamer(GstreamerRtspSource::new(camera)?),
                })
            }
            #[cfg(not(feature = "rtsp-gstreamer"))]
            {
                Err(SourceError::ConnectionFailed {
                    url: camera.url,
                    reason: "RTSP requires the rtsp-gstreamer feature".to_string(),
                })
            }
        }
    }
}

impl FrameSource for RtspSource {
    fn connect(&mut self) -> Result<(), SourceError> {
        match &mut self.backend {
            RtspBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        match &mut self.backend {
            RtspBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            RtspBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            RtspBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct SyntheticRtspSource {
    camera: CameraConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticRtspSource {
    fn new(camera: CameraConfig) -> Self {
        Self {
            camera,
            frame_count: 0,
            connected: false,
        }
    }

    fn connect(&mut self) -> Result<(), SourceError> {
        self.connected = true;
        log::info!("RtspSource: connected to {} (synthetic)", self.camera.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        if !self.connected {
            return Err(SourceError::ReadFailed {
                url: self.camera.url.clone(),
                reason: "source not connected".to_string(),
            });
        }
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Ok(Frame::new(
            pixels,
            self.camera.width,
            self.camera.height,
            PixelFormat::Rgb8,
        ))
    }

    /// Generate synthetic RGB pixels.
    ///
    /// Most frames are a dim gradient background. Once per cycle a fully
    /// saturated square appears for a few frames, which the stub detector
    /// reports as a face.
    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let width = self.camera.width as usize;
        let height = self.camera.height as usize;
        let mut pixels = vec![0u8; width * height * 3];

        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 128) as u8;
        }

        if self.frame_count % SYNTHETIC_CYCLE_FRAMES < SYNTHETIC_VISIT_FRAMES {
            let block = (width.min(height) / 4).max(8);
            let x0 = width / 4;
            let y0 = height / 4;
            for y in y0..(y0 + block).min(height) {
                for x in x0..(x0 + block).min(width) {
                    let idx = (y * width + x) * 3;
                    pixels[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
                }
            }
        }

        pixels
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.camera.url.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Production RTSP source using GStreamer
// ----------------------------------------------------------------------------

#[cfg(feature = "rtsp-gstreamer")]
#[derive(Debug)]
struct GstreamerRtspSource {
    camera: CameraConfig,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    saw_eos: bool,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstreamerRtspSource {
    /// Build the decode pipeline: rtspsrc ! decodebin ! videoconvert ! appsink,
    /// RGB caps, single drop-late buffer so a slow consumer never backlogs.
    fn new(camera: CameraConfig) -> Result<Self, SourceError> {
        let open_err = |reason: String| SourceError::ConnectionFailed {
            url: camera.url.clone(),
            reason,
        };

        gstreamer::init().map_err(|e| open_err(format!("initialize gstreamer: {}", e)))?;

        let pipeline_description = format!(
            "rtspsrc location={} latency=0 ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            camera.url
        );
        let pipeline = gstreamer::parse_launch(&pipeline_description)
            .map_err(|e| open_err(format!("build RTSP pipeline: {}", e)))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| open_err("RTSP pipeline is not a Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| open_err("appsink element missing from pipeline".to_string()))?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| open_err("appsink element has unexpected type".to_string()))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        Ok(Self {
            camera,
            pipeline,
            appsink,
            frame_count: 0,
            last_frame_at: None,
            connected_at: None,
            saw_eos: false,
        })
    }

    fn connect(&mut self) -> Result<(), SourceError> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| SourceError::ConnectionFailed {
                url: self.camera.url.clone(),
                reason: format!("set RTSP pipeline to Playing: {}", e),
            })?;
        self.connected_at = Some(Instant::now());
        self.saw_eos = false;
        log::info!("RtspSource: connected to {}", self.camera.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        self.poll_bus()?;

        let timeout = self.frame_timeout();
        let sample = self
            .appsink
            .try_pull_sample(timeout)
            .ok_or_else(|| SourceError::ReadFailed {
                url: self.camera.url.clone(),
                reason: format!("RTSP stream stalled for {:?}", timeout),
            })?;

        let (pixels, width, height) = sample_to_pixels(&sample, &self.camera.url)?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());

        Ok(Frame::new(pixels, width, height, PixelFormat::Rgb8))
    }

    fn is_healthy(&self) -> bool {
        if self.saw_eos {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.camera.url.clone(),
        }
    }

    fn frame_timeout(&self) -> Duration {
        let base_ms = if self.camera.target_fps == 0 {
            500
        } else {
            (1000 / self.camera.target_fps).saturating_mul(4)
        };
        Duration::from_millis(base_ms.max(500) as u64)
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.camera.target_fps == 0 {
            2_000
        } else {
            (1000 / self.camera.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }

    fn poll_bus(&mut self) -> Result<(), SourceError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(message) = bus.timed_pop(Duration::from_millis(0)) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Err(SourceError::ReadFailed {
                        url: self.camera.url.clone(),
                        reason: format!(
                            "gstreamer error from {:?}: {}",
                            err.src().map(|s| s.path_string()),
                            err.error()
                        ),
                    });
                }
                MessageView::Eos(..) => {
                    self.saw_eos = true;
                    return Err(SourceError::EndOfStream {
                        url: self.camera.url.clone(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl Drop for GstreamerRtspSource {
    fn drop(&mut self) {
        // Best effort; the stream handle must be released on every exit path.
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn sample_to_pixels(
    sample: &gstreamer::Sample,
    url: &str,
) -> Result<(Vec<u8>, u32, u32), SourceError> {
    let read_err = |reason: String| SourceError::ReadFailed {
        url: url.to_string(),
        reason,
    };

    let buffer = sample
        .buffer()
        .ok_or_else(|| read_err("RTSP sample missing buffer".to_string()))?;
    let caps = sample
        .caps()
        .ok_or_else(|| read_err("RTSP sample missing caps".to_string()))?;
    let info = gstreamer_video::VideoInfo::from_caps(caps)
        .map_err(|e| read_err(format!("parse RTSP caps as video info: {}", e)))?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride(0) as usize;

    let map = buffer
        .map_readable()
        .map_err(|e| read_err(format!("map RTSP buffer: {}", e)))?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .ok_or_else(|| read_err("RTSP buffer row is out of bounds".to_string()))?,
        );
    }

    Ok((pixels, width, height))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
