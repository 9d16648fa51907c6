use thiserror::Error;

use crate::detect::result::DetectionResult;

/// Errors produced by detector backends.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Model artifact missing or corrupt. Fatal at startup: no detection is
    /// possible without it.
    #[error("failed to load detection model from {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    /// A single inference pass failed. The pipeline logs and skips the frame.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Face detector backend trait.
///
/// `detect` takes `&self`: backends carry no per-call mutable state, which is
/// what allows one loaded model to be shared by reference across all camera
/// pipelines. Implementations must treat the pixel slice as read-only and
/// ephemeral.
pub trait FaceDetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run face detection on a packed RGB frame.
    fn detect(&self, pixels: &[u8], width: u32, height: u32)
        -> Result<DetectionResult, DetectError>;
}
