/// A detected face, in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

/// Result of running face detection on one frame. Ephemeral: consumed by the
/// overlay and alert stages, then dropped.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Detected faces, in the order the backend reported them.
    pub faces: Vec<FaceRegion>,
}

impl DetectionResult {
    /// Number of detected faces. This is the value carried by an alert.
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
