//! Face detection backends.
//!
//! Detection is delegated to a pretrained model treated as an opaque external
//! capability. Backends are immutable after construction so a single loaded
//! model can be shared across every camera pipeline behind an `Arc`.

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{DetectError, FaceDetectorBackend};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::BackendRegistry;
pub use result::{DetectionResult, FaceRegion};
