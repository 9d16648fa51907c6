//! Per-camera pipeline orchestrator.
//!
//! Each configured camera runs one pipeline on its own thread:
//!
//! ```text
//! Idle -> Connecting -> Streaming -> (Reconnecting | ShuttingDown) -> Closed
//! ```
//!
//! `Streaming` pulls a frame, runs the detector, draws the debug overlay and,
//! when faces are found, hands exactly one alert to the dispatcher without
//! blocking. Transient read failures are retried with bounded exponential
//! backoff; after a threshold of consecutive failures the source is reopened.
//! A cooperative shutdown flag is observed between iterations, and the source
//! handle is released on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alert::{AlertEvent, DispatchHandle};
use crate::config::{BackoffSettings, CameraConfig};
use crate::detect::FaceDetectorBackend;
use crate::ingest::{self, FrameSource, SourceError};
use crate::overlay;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Pipeline lifecycle states. Every transition is logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Connecting,
    Streaming,
    Reconnecting,
    ShuttingDown,
    Closed,
}

/// Bounded exponential backoff.
///
/// Delays grow strictly by the configured multiplier until the cap, and reset
/// on success. Callers add jitter when sleeping so concurrent pipelines do
/// not reconnect in lockstep.
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    next: Duration,
}

impl Backoff {
    pub fn new(settings: &BackoffSettings) -> Self {
        Self {
            initial: settings.initial,
            max: settings.max,
            multiplier: settings.multiplier,
            next: settings.initial,
        }
    }

    /// Current delay; advances the schedule for the next call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        let grown = self.next.mul_f64(self.multiplier);
        self.next = grown.min(self.max);
        delay
    }

    /// Reset to the initial delay after a successful operation.
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Granularity at which backoff sleeps re-check the shutdown flag.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Sleep for the given delay plus up to 10% random jitter.
///
/// The sleep is sliced so a shutdown request cuts it short instead of
/// stalling the pipeline for a full backoff interval.
fn sleep_with_jitter(delay: Duration, shutdown: &AtomicBool) {
    let jitter = delay.mul_f64(rand::random::<f64>() * 0.1);
    let mut remaining = delay + jitter;
    while remaining > Duration::ZERO && !shutdown.load(Ordering::Relaxed) {
        let step = remaining.min(SLEEP_SLICE);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

/// Builds (or rebuilds) the frame source for a pipeline.
pub type SourceFactory = Box<dyn FnMut() -> Result<Box<dyn FrameSource>, SourceError> + Send>;

/// One camera's ingestion-and-alerting pipeline.
pub struct CameraPipeline {
    camera: CameraConfig,
    detector: Arc<dyn FaceDetectorBackend>,
    alerts: DispatchHandle,
    backoff_settings: BackoffSettings,
    source_factory: SourceFactory,
    state: PipelineState,
}

impl CameraPipeline {
    pub fn new(
        camera: CameraConfig,
        detector: Arc<dyn FaceDetectorBackend>,
        alerts: DispatchHandle,
        backoff_settings: BackoffSettings,
    ) -> Self {
        let factory_camera = camera.clone();
        Self {
            camera,
            detector,
            alerts,
            backoff_settings,
            source_factory: Box::new(move || ingest::open_source(&factory_camera)),
            state: PipelineState::Idle,
        }
    }

    /// Replace the source factory. Used by tests to inject scripted sources.
    pub fn with_source_factory(mut self, factory: SourceFactory) -> Self {
        self.source_factory = factory;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the pipeline until the stream ends or shutdown is requested.
    ///
    /// All errors are handled internally; a pipeline never propagates a
    /// failure that could take down its siblings.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        let mut backoff = Backoff::new(&self.backoff_settings);

        'lifecycle: loop {
            self.transition(PipelineState::Connecting);
            let Some(mut source) = self.connect_with_backoff(shutdown, &mut backoff) else {
                break 'lifecycle;
            };

            match self.stream(shutdown, &mut source, &mut backoff) {
                StreamOutcome::Reconnect => {
                    // Source dropped here; the handle is released before reopen.
                    self.transition(PipelineState::Reconnecting);
                    let delay = backoff.next_delay();
                    log::warn!(
                        "pipeline {}: reconnecting in {:?}",
                        self.camera.id,
                        delay
                    );
                    sleep_with_jitter(delay, shutdown);
                    continue 'lifecycle;
                }
                StreamOutcome::EndOfStream => {
                    log::info!("pipeline {}: stream ended", self.camera.id);
                    break 'lifecycle;
                }
                StreamOutcome::Shutdown => break 'lifecycle,
            }
        }

        if self.state != PipelineState::ShuttingDown {
            self.transition(PipelineState::ShuttingDown);
        }
        self.transition(PipelineState::Closed);
    }

    /// Open the source, retrying with capped exponential backoff.
    ///
    /// Returns `None` when shutdown was requested while connecting.
    fn connect_with_backoff(
        &mut self,
        shutdown: &AtomicBool,
        backoff: &mut Backoff,
    ) -> Option<Box<dyn FrameSource>> {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                self.transition(PipelineState::ShuttingDown);
                return None;
            }
            let attempt = (self.source_factory)().and_then(|mut source| {
                source.connect()?;
                Ok(source)
            });
            match attempt {
                Ok(source) => {
                    backoff.reset();
                    return Some(source);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    log::warn!(
                        "pipeline {}: connect failed, retrying in {:?}: {}",
                        self.camera.id,
                        delay,
                        e
                    );
                    sleep_with_jitter(delay, shutdown);
                }
            }
        }
    }

    /// The `Streaming` loop: read, detect, draw, maybe alert.
    fn stream(
        &mut self,
        shutdown: &AtomicBool,
        source: &mut Box<dyn FrameSource>,
        backoff: &mut Backoff,
    ) -> StreamOutcome {
        self.transition(PipelineState::Streaming);

        let frame_interval = Duration::from_millis(1000 / self.camera.target_fps.max(1) as u64);
        let mut consecutive_read_failures = 0u32;
        let mut last_health_log = Instant::now();

        loop {
            if shutdown.load(Ordering::Relaxed) {
                self.transition(PipelineState::ShuttingDown);
                return StreamOutcome::Shutdown;
            }

            match source.next_frame() {
                Ok(mut frame) => {
                    consecutive_read_failures = 0;
                    backoff.reset();
                    self.process_frame(&mut frame);
                }
                Err(SourceError::EndOfStream { .. }) => return StreamOutcome::EndOfStream,
                Err(e) => {
                    consecutive_read_failures += 1;
                    if consecutive_read_failures >= self.backoff_settings.read_failure_threshold {
                        log::warn!(
                            "pipeline {}: {} consecutive read failures, reopening stream: {}",
                            self.camera.id,
                            consecutive_read_failures,
                            e
                        );
                        return StreamOutcome::Reconnect;
                    }
                    let delay = backoff.next_delay();
                    log::warn!(
                        "pipeline {}: read failed, retrying in {:?}: {}",
                        self.camera.id,
                        delay,
                        e
                    );
                    sleep_with_jitter(delay, shutdown);
                    continue;
                }
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = source.stats();
                log::info!(
                    "pipeline {}: health={} frames={} url={}",
                    self.camera.id,
                    source.is_healthy(),
                    stats.frames_captured,
                    stats.url
                );
                last_health_log = Instant::now();
            }

            std::thread::sleep(frame_interval);
        }
    }

    /// Detect, overlay, and alert for one frame.
    fn process_frame(&mut self, frame: &mut crate::frame::Frame) {
        let result = match self
            .detector
            .detect(frame.pixels(), frame.width, frame.height)
        {
            Ok(result) => result,
            Err(e) => {
                // A failed inference pass skips the frame; it is not a
                // stream error and does not count toward reconnects.
                log::warn!("pipeline {}: detection failed, skipping frame: {}", self.camera.id, e);
                return;
            }
        };

        if result.is_empty() {
            return;
        }

        overlay::draw_regions(frame, &result.faces);
        log::info!(
            "pipeline {}: detected {} face(s)",
            self.camera.id,
            result.face_count()
        );
        self.alerts.dispatch(AlertEvent::new(
            &self.camera.id,
            frame.captured_at,
            result.face_count(),
        ));
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state == next {
            return;
        }
        log::info!(
            "pipeline {}: {:?} -> {:?}",
            self.camera.id,
            self.state,
            next
        );
        self.state = next;
    }
}

enum StreamOutcome {
    Reconnect,
    EndOfStream,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffSettings;

    fn settings(initial_ms: u64, max_ms: u64, multiplier: f64) -> BackoffSettings {
        BackoffSettings {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms),
            multiplier,
            read_failure_threshold: 3,
        }
    }

    #[test]
    fn backoff_delays_increase_strictly_until_the_cap() {
        let mut backoff = Backoff::new(&settings(100, 1_000, 2.0));

        let delays: Vec<Duration> = (0..6).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(800));
        // Capped.
        assert_eq!(delays[4], Duration::from_millis(1_000));
        assert_eq!(delays[5], Duration::from_millis(1_000));

        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        let below_cap: Vec<_> = delays.iter().filter(|d| **d < Duration::from_millis(1_000)).collect();
        for pair in below_cap.windows(2) {
            assert!(pair[1] > pair[0], "delays below the cap must strictly increase");
        }
    }

    #[test]
    fn backoff_resets_to_initial() {
        let mut backoff = Backoff::new(&settings(50, 500, 2.0));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }
}
