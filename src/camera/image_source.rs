//! Still-image frame source.
//!
//! Replays PNG/JPEG/BMP files from a directory in file-name order. Used for
//! offline runs without a camera and for exercising the pipeline in tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Frame, FrameSource};
use crate::error::PipelineError;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Frame source backed by image files.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    frame_count: u64,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            cursor: 0,
            looping: false,
            frame_count: 0,
        }
    }

    /// Restart from the first file instead of ending the stream.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<(), PipelineError> {
        let files = Self::list_images(&self.dir).map_err(|e| {
            PipelineError::CameraUnavailable(format!("{}: {}", self.dir.display(), e))
        })?;
        if files.is_empty() {
            return Err(PipelineError::CameraUnavailable(format!(
                "no images in {}",
                self.dir.display()
            )));
        }

        log::info!("Replaying {} images from {}", files.len(), self.dir.display());
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<Frame, PipelineError> {
        if self.files.is_empty() {
            return Err(PipelineError::FrameReadError("source not opened".to_string()));
        }
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Err(PipelineError::EndOfStream);
            }
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        self.cursor += 1;

        let image = image::open(path)
            .map_err(|e| PipelineError::FrameReadError(format!("{}: {}", path.display(), e)))?
            .to_rgb8();

        self.frame_count += 1;
        Ok(Frame::new(image, self.frame_count))
    }

    fn close(&mut self) {
        self.files.clear();
        self.cursor = 0;
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.dir.display())
    }
}
