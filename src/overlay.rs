//! Debug overlay drawing.
//!
//! Draws bounding boxes around detected faces directly into the frame buffer.
//! This is a display/debug aid only: the frame is discarded at the end of the
//! pipeline iteration and the overlay has no effect on detection or alerting.

use crate::detect::FaceRegion;
use crate::frame::Frame;

/// Box color (RGB). Green, matching the conventional detection overlay.
const BOX_COLOR: [u8; 3] = [0, 255, 0];
/// Box edge thickness in pixels.
const BOX_THICKNESS: u32 = 2;

/// Draw a rectangle around each detected region, clipped to frame bounds.
pub fn draw_regions(frame: &mut Frame, regions: &[FaceRegion]) {
    for region in regions {
        draw_rect(frame, region);
    }
}

fn draw_rect(frame: &mut Frame, region: &FaceRegion) {
    let (fw, fh) = (frame.width, frame.height);
    if fw == 0 || fh == 0 || region.width == 0 || region.height == 0 {
        return;
    }

    let x0 = region.x.min(fw.saturating_sub(1));
    let y0 = region.y.min(fh.saturating_sub(1));
    let x1 = (region.x + region.width).min(fw);
    let y1 = (region.y + region.height).min(fh);

    for t in 0..BOX_THICKNESS {
        // Horizontal edges.
        for x in x0..x1 {
            if y0 + t < fh {
                set_pixel(frame, x, y0 + t);
            }
            if y1 > t && y1 - t - 1 < fh {
                set_pixel(frame, x, y1 - t - 1);
            }
        }
        // Vertical edges.
        for y in y0..y1 {
            if x0 + t < fw {
                set_pixel(frame, x0 + t, y);
            }
            if x1 > t && x1 - t - 1 < fw {
                set_pixel(frame, x1 - t - 1, y);
            }
        }
    }
}

fn set_pixel(frame: &mut Frame, x: u32, y: u32) {
    let width = frame.width as usize;
    let idx = (y as usize * width + x as usize) * 3;
    frame.pixels_mut()[idx..idx + 3].copy_from_slice(&BOX_COLOR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn blank_frame(width: u32, height: u32) -> Frame {
        Frame::new(
            vec![0u8; width as usize * height as usize * 3],
            width,
            height,
            PixelFormat::Rgb8,
        )
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * frame.width + x) * 3) as usize;
        let p = frame.pixels();
        [p[idx], p[idx + 1], p[idx + 2]]
    }

    #[test]
    fn draws_box_edges_in_green() {
        let mut frame = blank_frame(32, 32);
        let region = FaceRegion {
            x: 8,
            y: 8,
            width: 12,
            height: 12,
            confidence: 0.9,
        };
        draw_regions(&mut frame, &[region]);

        // Corner and edge pixels are painted.
        assert_eq!(pixel(&frame, 8, 8), BOX_COLOR);
        assert_eq!(pixel(&frame, 19, 8), BOX_COLOR);
        assert_eq!(pixel(&frame, 8, 19), BOX_COLOR);
        // Interior stays untouched.
        assert_eq!(pixel(&frame, 14, 14), [0, 0, 0]);
    }

    #[test]
    fn regions_outside_the_frame_are_clipped() {
        let mut frame = blank_frame(16, 16);
        let region = FaceRegion {
            x: 12,
            y: 12,
            width: 40,
            height: 40,
            confidence: 0.9,
        };
        // Must not panic on out-of-bounds coordinates.
        draw_regions(&mut frame, &[region]);
        assert_eq!(pixel(&frame, 12, 12), BOX_COLOR);
    }

    #[test]
    fn empty_region_list_leaves_frame_unchanged() {
        let mut frame = blank_frame(8, 8);
        draw_regions(&mut frame, &[]);
        assert!(frame.pixels().iter().all(|&p| p == 0));
    }
}
