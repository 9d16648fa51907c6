use crate::detect::backend::{DetectError, FaceDetectorBackend};
use crate::detect::result::{DetectionResult, FaceRegion};

/// Grid cell size for the saturation scan, in pixels.
const CELL: u32 = 8;
/// Mean channel value above which a cell counts as saturated.
const SATURATION_FLOOR: u32 = 250;

/// Stub backend for testing and `stub://` sources.
///
/// Scans the frame in 8x8 cells and reports each connected cluster of fully
/// saturated cells as one face. The synthetic sources emit exactly such
/// blocks, so the stub gives the full pipeline deterministic detections
/// without a model artifact.
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceDetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<DetectionResult, DetectError> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(DetectError::Inference(format!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            )));
        }

        let cells_x = (width / CELL) as usize;
        let cells_y = (height / CELL) as usize;
        if cells_x == 0 || cells_y == 0 {
            return Ok(DetectionResult::default());
        }

        let saturated = saturation_grid(pixels, width, cells_x, cells_y);
        let faces = cluster_cells(&saturated, cells_x, cells_y);

        Ok(DetectionResult { faces })
    }
}

/// Mark each cell whose mean channel value is saturated.
fn saturation_grid(pixels: &[u8], width: u32, cells_x: usize, cells_y: usize) -> Vec<bool> {
    let mut grid = vec![false; cells_x * cells_y];
    for cy in 0..cells_y {
        for cx in 0..cells_x {
            let mut sum: u32 = 0;
            let mut count: u32 = 0;
            for dy in 0..CELL as usize {
                let y = cy * CELL as usize + dy;
                let row_start = (y * width as usize + cx * CELL as usize) * 3;
                for dx in 0..CELL as usize * 3 {
                    sum += pixels[row_start + dx] as u32;
                    count += 1;
                }
            }
            grid[cy * cells_x + cx] = sum / count >= SATURATION_FLOOR;
        }
    }
    grid
}

/// Merge 4-connected saturated cells into bounding regions.
fn cluster_cells(grid: &[bool], cells_x: usize, cells_y: usize) -> Vec<FaceRegion> {
    let mut visited = vec![false; grid.len()];
    let mut faces = Vec::new();

    for start in 0..grid.len() {
        if !grid[start] || visited[start] {
            continue;
        }
        let (mut min_x, mut min_y) = (start % cells_x, start / cells_x);
        let (mut max_x, mut max_y) = (min_x, min_y);

        let mut stack = vec![start];
        visited[start] = true;
        while let Some(idx) = stack.pop() {
            let (cx, cy) = (idx % cells_x, idx / cells_x);
            min_x = min_x.min(cx);
            max_x = max_x.max(cx);
            min_y = min_y.min(cy);
            max_y = max_y.max(cy);

            let mut push = |nx: usize, ny: usize| {
                let nidx = ny * cells_x + nx;
                if grid[nidx] && !visited[nidx] {
                    visited[nidx] = true;
                    stack.push(nidx);
                }
            };
            if cx > 0 {
                push(cx - 1, cy);
            }
            if cx + 1 < cells_x {
                push(cx + 1, cy);
            }
            if cy > 0 {
                push(cx, cy - 1);
            }
            if cy + 1 < cells_y {
                push(cx, cy + 1);
            }
        }

        faces.push(FaceRegion {
            x: min_x as u32 * CELL,
            y: min_y as u32 * CELL,
            width: (max_x - min_x + 1) as u32 * CELL,
            height: (max_y - min_y + 1) as u32 * CELL,
            confidence: 0.99,
        });
    }

    faces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_frame(width: u32, height: u32) -> Vec<u8> {
        vec![10u8; width as usize * height as usize * 3]
    }

    fn paint_block(pixels: &mut [u8], width: u32, x0: u32, y0: u32, size: u32) {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                let idx = ((y * width + x) * 3) as usize;
                pixels[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
    }

    #[test]
    fn blank_frame_yields_no_faces() {
        let backend = StubBackend::new();
        let result = backend.detect(&blank_frame(64, 48), 64, 48).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.face_count(), 0);
    }

    #[test]
    fn two_separated_blocks_yield_two_faces() {
        let mut pixels = blank_frame(64, 48);
        paint_block(&mut pixels, 64, 0, 0, 16);
        paint_block(&mut pixels, 64, 40, 32, 16);

        let backend = StubBackend::new();
        let result = backend.detect(&pixels, 64, 48).unwrap();
        assert_eq!(result.face_count(), 2);
    }

    #[test]
    fn region_bounds_cover_the_block() {
        let mut pixels = blank_frame(64, 48);
        paint_block(&mut pixels, 64, 16, 8, 16);

        let backend = StubBackend::new();
        let result = backend.detect(&pixels, 64, 48).unwrap();
        assert_eq!(result.face_count(), 1);

        let face = &result.faces[0];
        assert!(face.x <= 16 && face.x + face.width >= 32);
        assert!(face.y <= 8 && face.y + face.height >= 24);
    }

    #[test]
    fn wrong_buffer_length_is_an_inference_error() {
        let backend = StubBackend::new();
        let err = backend.detect(&[0u8; 10], 64, 48).unwrap_err();
        assert!(matches!(err, DetectError::Inference(_)));
    }
}
