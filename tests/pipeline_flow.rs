//! End-to-end pipeline scenarios using scripted sources, detectors, and sinks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use facewatch::alert::{AlertDispatcher, AlertEvent, AlertSink, SinkError};
use facewatch::config::{AlertSettings, BackoffSettings, CameraConfig};
use facewatch::detect::{DetectError, DetectionResult, FaceDetectorBackend, FaceRegion};
use facewatch::frame::{Frame, PixelFormat};
use facewatch::ingest::{FrameSource, SourceError, SourceStats};
use facewatch::pipeline::{CameraPipeline, PipelineState};

const TEST_URL: &str = "scripted://cam";

/// One step of a scripted source.
#[derive(Debug)]
enum Step {
    /// Emit a frame whose first byte encodes the face count the scripted
    /// detector will report.
    Frame(u8),
    ReadFail,
    Eos,
}

#[derive(Debug)]
struct ScriptedSource {
    steps: Arc<Mutex<VecDeque<Step>>>,
    frames: u64,
}

impl FrameSource for ScriptedSource {
    fn connect(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Frame(count)) => {
                self.frames += 1;
                let mut data = vec![0u8; 8 * 8 * 3];
                data[0] = count;
                Ok(Frame::new(data, 8, 8, PixelFormat::Rgb8))
            }
            Some(Step::ReadFail) => Err(SourceError::ReadFailed {
                url: TEST_URL.to_string(),
                reason: "scripted failure".to_string(),
            }),
            Some(Step::Eos) | None => Err(SourceError::EndOfStream {
                url: TEST_URL.to_string(),
            }),
        }
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames,
            url: TEST_URL.to_string(),
        }
    }
}

/// Reports as many faces as the frame's first byte says.
struct ScriptedDetector;

impl FaceDetectorBackend for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(
        &self,
        pixels: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<DetectionResult, DetectError> {
        let count = pixels.first().copied().unwrap_or(0) as usize;
        let faces = (0..count)
            .map(|_| FaceRegion {
                x: 0,
                y: 0,
                width: 4,
                height: 4,
                confidence: 0.9,
            })
            .collect();
        Ok(DetectionResult { faces })
    }
}

struct RecordingSink {
    events: Arc<Mutex<Vec<AlertEvent>>>,
}

impl AlertSink for RecordingSink {
    fn notify(&self, event: &AlertEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct FailingSink;

impl AlertSink for FailingSink {
    fn notify(&self, _event: &AlertEvent) -> Result<(), SinkError> {
        Err(SinkError::SendFailed {
            endpoint: "http://down".to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

fn camera() -> CameraConfig {
    CameraConfig {
        id: "cam-1".to_string(),
        url: TEST_URL.to_string(),
        target_fps: 1000,
        width: 8,
        height: 8,
    }
}

fn fast_backoff(read_failure_threshold: u32) -> BackoffSettings {
    BackoffSettings {
        initial: Duration::from_millis(1),
        max: Duration::from_millis(8),
        multiplier: 2.0,
        read_failure_threshold,
    }
}

fn alert_settings() -> AlertSettings {
    AlertSettings {
        endpoint: "http://127.0.0.1:0/alert".to_string(),
        timeout: Duration::from_millis(50),
        queue_depth: 16,
        max_retries: 0,
        retry_initial: Duration::from_millis(1),
    }
}

fn scripted_factory(
    steps: Arc<Mutex<VecDeque<Step>>>,
    opens: Arc<AtomicU32>,
) -> facewatch::pipeline::SourceFactory {
    Box::new(move || {
        opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            steps: steps.clone(),
            frames: 0,
        }))
    })
}

fn run_pipeline(
    steps: Vec<Step>,
    read_failure_threshold: u32,
    sink: Box<dyn AlertSink>,
) -> (u32, PipelineState) {
    let steps = Arc::new(Mutex::new(VecDeque::from(steps)));
    let opens = Arc::new(AtomicU32::new(0));

    let dispatcher = AlertDispatcher::spawn(sink, &alert_settings()).expect("dispatcher");
    let mut pipeline = CameraPipeline::new(
        camera(),
        Arc::new(ScriptedDetector),
        dispatcher.handle(),
        fast_backoff(read_failure_threshold),
    )
    .with_source_factory(scripted_factory(steps, opens.clone()));

    pipeline.run(&AtomicBool::new(false));
    dispatcher.shutdown();

    (opens.load(Ordering::SeqCst), pipeline.state())
}

#[test]
fn one_alert_per_detection_positive_frame() {
    // F1(no faces), F2(2 faces), F3(no faces): exactly one alert, faces == 2.
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink {
        events: events.clone(),
    };

    let steps = Arc::new(Mutex::new(VecDeque::from(vec![
        Step::Frame(0),
        Step::Frame(2),
        Step::Frame(0),
        Step::Eos,
    ])));
    let opens = Arc::new(AtomicU32::new(0));
    let dispatcher = AlertDispatcher::spawn(Box::new(sink), &alert_settings()).expect("dispatcher");
    let mut pipeline = CameraPipeline::new(
        camera(),
        Arc::new(ScriptedDetector),
        dispatcher.handle(),
        fast_backoff(3),
    )
    .with_source_factory(scripted_factory(steps, opens.clone()));

    pipeline.run(&AtomicBool::new(false));
    dispatcher.shutdown();

    let alerts = events.lock().unwrap();
    assert_eq!(alerts.len(), 1, "exactly one alert for the one positive frame");
    assert_eq!(alerts[0].faces, 2);
    assert_eq!(alerts[0].camera_id, "cam-1");
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.state(), PipelineState::Closed);
}

#[test]
fn send_failed_does_not_stall_the_frame_loop() {
    // Every delivery fails; the pipeline must still consume all frames and
    // end cleanly.
    let (opens, state) = run_pipeline(
        vec![
            Step::Frame(1),
            Step::Frame(1),
            Step::Frame(1),
            Step::Frame(2),
            Step::Eos,
        ],
        3,
        Box::new(FailingSink),
    );

    assert_eq!(opens, 1);
    assert_eq!(state, PipelineState::Closed);
}

#[test]
fn read_failures_below_threshold_keep_the_source() {
    // Two failures with threshold 3: retry on the same source, no reopen.
    let (opens, state) = run_pipeline(
        vec![
            Step::Frame(0),
            Step::ReadFail,
            Step::ReadFail,
            Step::Frame(0),
            Step::Eos,
        ],
        3,
        Box::new(FailingSink),
    );

    assert_eq!(opens, 1, "source must not be reopened below the threshold");
    assert_eq!(state, PipelineState::Closed);
}

#[test]
fn repeated_read_failures_reopen_the_source() {
    // Three consecutive failures with threshold 3: reconnect once, then the
    // remaining script plays out on the new source.
    let (opens, state) = run_pipeline(
        vec![
            Step::ReadFail,
            Step::ReadFail,
            Step::ReadFail,
            Step::Frame(0),
            Step::Eos,
        ],
        3,
        Box::new(FailingSink),
    );

    assert_eq!(opens, 2, "threshold crossing must reopen the source");
    assert_eq!(state, PipelineState::Closed);
}

#[test]
fn connect_failures_are_retried_until_success() {
    let attempts = Arc::new(AtomicU32::new(0));
    let steps = Arc::new(Mutex::new(VecDeque::from(vec![Step::Frame(0), Step::Eos])));

    let factory_attempts = attempts.clone();
    let factory: facewatch::pipeline::SourceFactory = Box::new(move || {
        let n = factory_attempts.fetch_add(1, Ordering::SeqCst);
        if n < 3 {
            Err(SourceError::ConnectionFailed {
                url: TEST_URL.to_string(),
                reason: "scripted open failure".to_string(),
            })
        } else {
            Ok(Box::new(ScriptedSource {
                steps: steps.clone(),
                frames: 0,
            }))
        }
    });

    let dispatcher = AlertDispatcher::spawn(Box::new(FailingSink), &alert_settings()).expect("dispatcher");
    let mut pipeline = CameraPipeline::new(
        camera(),
        Arc::new(ScriptedDetector),
        dispatcher.handle(),
        fast_backoff(3),
    )
    .with_source_factory(factory);

    pipeline.run(&AtomicBool::new(false));
    dispatcher.shutdown();

    assert_eq!(attempts.load(Ordering::SeqCst), 4, "three failures, then success");
    assert_eq!(pipeline.state(), PipelineState::Closed);
}

#[test]
fn shutdown_interrupts_a_backoff_sleep() {
    // The source never opens and the backoff interval is long; a shutdown
    // request mid-sleep must still stop the pipeline promptly.
    let backoff = BackoffSettings {
        initial: Duration::from_secs(2),
        max: Duration::from_secs(2),
        multiplier: 2.0,
        read_failure_threshold: 3,
    };
    let factory: facewatch::pipeline::SourceFactory = Box::new(|| {
        Err(SourceError::ConnectionFailed {
            url: TEST_URL.to_string(),
            reason: "scripted open failure".to_string(),
        })
    });

    let dispatcher = AlertDispatcher::spawn(Box::new(FailingSink), &alert_settings()).expect("dispatcher");
    let mut pipeline = CameraPipeline::new(
        camera(),
        Arc::new(ScriptedDetector),
        dispatcher.handle(),
        backoff,
    )
    .with_source_factory(factory);

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    let setter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        flag.store(true, Ordering::SeqCst);
    });

    let started = std::time::Instant::now();
    pipeline.run(&shutdown);
    let elapsed = started.elapsed();

    setter.join().expect("setter thread");
    dispatcher.shutdown();

    assert!(
        elapsed < Duration::from_secs(1),
        "pipeline took {:?} to observe shutdown",
        elapsed
    );
    assert_eq!(pipeline.state(), PipelineState::Closed);
}

#[test]
fn shutdown_flag_stops_the_pipeline_before_connecting() {
    let opens = Arc::new(AtomicU32::new(0));
    let steps = Arc::new(Mutex::new(VecDeque::new()));

    let dispatcher = AlertDispatcher::spawn(Box::new(FailingSink), &alert_settings()).expect("dispatcher");
    let mut pipeline = CameraPipeline::new(
        camera(),
        Arc::new(ScriptedDetector),
        dispatcher.handle(),
        fast_backoff(3),
    )
    .with_source_factory(scripted_factory(steps, opens.clone()));

    let shutdown = AtomicBool::new(true);
    pipeline.run(&shutdown);
    dispatcher.shutdown();

    assert_eq!(opens.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.state(), PipelineState::Closed);
}
