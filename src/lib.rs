//! facewatch
//!
//! A multi-camera face detection and alerting worker. Each configured camera
//! runs an independent pipeline that pulls frames from its stream, runs a
//! pretrained face detector, draws debug bounding boxes, and delivers a
//! structured alert over HTTP whenever faces are found.
//!
//! # Module Structure
//!
//! - `config`: worker configuration (cameras, detector, alerts, backoff)
//! - `frame`: in-memory frame representation
//! - `ingest`: frame sources (RTSP, local files, synthetic stubs)
//! - `detect`: face detector backends and registry
//! - `overlay`: debug bounding-box drawing
//! - `alert`: alert events, HTTP sink, bounded dispatch queue
//! - `pipeline`: per-camera orchestration (state machine, backoff, reconnect)
//!
//! # Resilience model
//!
//! Failures are isolated per camera: a dead stream triggers bounded
//! exponential backoff and reconnection for that pipeline only. Alert
//! delivery is decoupled from the frame loop by a bounded queue, so a slow
//! collector never stalls capture. The detection model is loaded once at
//! startup (fatal on failure) and shared immutably across all pipelines.

pub mod alert;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;

pub use alert::{AlertDispatcher, AlertEvent, AlertSink, DispatchHandle, HttpAlertSink, SinkError};
pub use config::{AlertSettings, BackoffSettings, CameraConfig, DetectorSettings, WorkerConfig};
pub use detect::{BackendRegistry, DetectError, DetectionResult, FaceDetectorBackend, FaceRegion, StubBackend};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::{Frame, PixelFormat};
pub use ingest::{open_source, FileSource, FrameSource, RtspSource, SourceError, SourceStats};
pub use pipeline::{Backoff, CameraPipeline, PipelineState, SourceFactory};
