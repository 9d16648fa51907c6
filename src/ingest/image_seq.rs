#![cfg(feature = "ingest-image")]

//! Still-image sequence backend for `FileSource`.
//!
//! Plays back a single JPEG or a directory of JPEGs (sorted by file name) as
//! a frame stream, paced to the configured target fps. Used for offline
//! testing of the detection and alerting path against recorded footage.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::frame::{Frame, PixelFormat};

use super::{SourceError, SourceStats};

#[derive(Debug)]
pub(crate) struct ImageSeqSource {
    display_path: String,
    paths: Vec<PathBuf>,
    next_index: usize,
    frame_count: u64,
    target_fps: u32,
    last_frame_at: Option<Instant>,
}

impl ImageSeqSource {
    pub(crate) fn new(path: String, target_fps: u32) -> Result<Self, SourceError> {
        Ok(Self {
            display_path: path,
            paths: Vec::new(),
            next_index: 0,
            frame_count: 0,
            target_fps,
            last_frame_at: None,
        })
    }

    pub(crate) fn connect(&mut self) -> Result<(), SourceError> {
        let root = Path::new(&self.display_path);
        let open_err = |reason: String| SourceError::ConnectionFailed {
            url: self.display_path.clone(),
            reason,
        };

        if root.is_dir() {
            let entries = std::fs::read_dir(root)
                .map_err(|e| open_err(format!("read directory: {}", e)))?;
            let mut paths: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_jpeg(p))
                .collect();
            paths.sort();
            if paths.is_empty() {
                return Err(open_err("directory contains no JPEG frames".to_string()));
            }
            self.paths = paths;
        } else if root.is_file() {
            self.paths = vec![root.to_path_buf()];
        } else {
            return Err(open_err("path does not exist".to_string()));
        }

        self.next_index = 0;
        log::info!(
            "FileSource: connected to {} ({} frames)",
            self.display_path,
            self.paths.len()
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let Some(path) = self.paths.get(self.next_index) else {
            return Err(SourceError::EndOfStream {
                url: self.display_path.clone(),
            });
        };

        self.pace();

        let decoded = image::ImageReader::open(path)
            .map_err(|e| self.read_err(format!("open {}: {}", path.display(), e)))?
            .decode()
            .map_err(|e| self.read_err(format!("decode {}: {}", path.display(), e)))?
            .to_rgb8();

        let (width, height) = (decoded.width(), decoded.height());
        let pixels = decoded.into_raw();

        self.next_index += 1;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());

        Ok(Frame::new(pixels, width, height, PixelFormat::Rgb8))
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.next_index < self.paths.len()
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.display_path.clone(),
        }
    }

    fn read_err(&self, reason: String) -> SourceError {
        SourceError::ReadFailed {
            url: self.display_path.clone(),
            reason,
        }
    }

    /// Sleep to hold the configured playback rate.
    fn pace(&self) {
        let Some(last) = self.last_frame_at else {
            return;
        };
        if self.target_fps == 0 {
            return;
        }
        let interval = Duration::from_millis(1000 / self.target_fps as u64);
        let elapsed = last.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
}

fn is_jpeg(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
    )
}
