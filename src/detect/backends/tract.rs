#![cfg(feature = "backend-tract")]

use std::path::Path;

use tract_onnx::prelude::*;

use crate::detect::backend::{DetectError, FaceDetectorBackend};
use crate::detect::result::{DetectionResult, FaceRegion};

/// Values per detection row in the model output: x, y, w, h, score.
const ROW_LEN: usize = 5;

/// Tract-based face detector running a pretrained ONNX model.
///
/// The model is loaded once at startup; a load failure is fatal since no
/// detection is possible without it. Expects frames matching the configured
/// input size and an output of `[1, N, 5]` rows with normalized box
/// coordinates and a score.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self, DetectError> {
        let model_path = model_path.as_ref();
        let load_err = |reason: String| DetectError::ModelLoad {
            path: model_path.display().to_string(),
            reason,
        };

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| load_err(format!("read model: {}", e)))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .map_err(|e| load_err(format!("set input fact: {}", e)))?
            .into_optimized()
            .map_err(|e| load_err(format!("optimize model: {}", e)))?
            .into_runnable()
            .map_err(|e| load_err(format!("build runnable model: {}", e)))?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.5,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor, DetectError> {
        if width != self.width || height != self.height {
            return Err(DetectError::Inference(format!(
                "frame size {}x{} does not match model input {}x{}",
                width, height, self.width, self.height
            )));
        }

        let expected_len = width as usize * height as usize * 3;
        if pixels.len() != expected_len {
            return Err(DetectError::Inference(format!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            )));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    /// Decode `[1, N, 5]` output rows into pixel-space face regions.
    fn decode_output(&self, outputs: TVec<TValue>) -> Result<Vec<FaceRegion>, DetectError> {
        let output = outputs
            .first()
            .ok_or_else(|| DetectError::Inference("model produced no outputs".to_string()))?;
        let values = output
            .to_array_view::<f32>()
            .map_err(|e| DetectError::Inference(format!("output tensor was not f32: {}", e)))?;

        let flat: Vec<f32> = values.iter().copied().collect();
        if flat.len() % ROW_LEN != 0 {
            return Err(DetectError::Inference(format!(
                "output length {} is not a multiple of {}",
                flat.len(),
                ROW_LEN
            )));
        }

        let mut faces = Vec::new();
        for row in flat.chunks_exact(ROW_LEN) {
            let score = row[4];
            if score < self.confidence_threshold {
                continue;
            }
            let clamp = |v: f32| v.clamp(0.0, 1.0);
            faces.push(FaceRegion {
                x: (clamp(row[0]) * self.width as f32) as u32,
                y: (clamp(row[1]) * self.height as f32) as u32,
                width: (clamp(row[2]) * self.width as f32) as u32,
                height: (clamp(row[3]) * self.height as f32) as u32,
                confidence: score,
            });
        }
        Ok(faces)
    }
}

impl FaceDetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<DetectionResult, DetectError> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DetectError::Inference(format!("ONNX inference failed: {}", e)))?;
        let faces = self.decode_output(outputs)?;

        Ok(DetectionResult { faces })
    }
}
