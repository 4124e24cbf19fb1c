//! Frame acquisition.
//!
//! A [`FrameSource`] hands out one frame per request. Sources that block
//! (webcams) are wrapped in a [`CaptureThread`], which publishes into a
//! single-slot [`LatestFrameSlot`] so detection always sees the freshest
//! complete frame.

mod capture;
mod image_source;
#[cfg(feature = "camera")]
mod nokhwa_source;
mod slot;

use std::time::{Duration, Instant};

use image::RgbImage;

use crate::error::PipelineError;

pub use capture::CaptureThread;
pub use image_source::ImageSequenceSource;
#[cfg(feature = "camera")]
pub use nokhwa_source::NokhwaSource;
pub use slot::LatestFrameSlot;

/// One captured camera frame (RGB8).
#[derive(Clone)]
pub struct Frame {
    /// Pixel data
    pub image: RgbImage,
    /// Sequence number assigned by the source
    pub frame_number: u64,
    /// Capture time
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, frame_number: u64) -> Self {
        Self {
            image,
            frame_number,
            timestamp: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("frame_number", &self.frame_number)
            .finish()
    }
}

/// Supplier of camera frames.
///
/// Errors are reported upward and never retried inside a source; teardown,
/// retry and fallback decisions belong to the caller.
pub trait FrameSource {
    /// Acquire the device. Fails with [`PipelineError::CameraUnavailable`].
    fn open(&mut self) -> Result<(), PipelineError>;

    /// Read the next frame, waiting at most `timeout`.
    ///
    /// Fails with [`PipelineError::FrameReadError`] on I/O problems or
    /// timeout, and [`PipelineError::EndOfStream`] when a finite source runs
    /// out.
    fn read(&mut self, timeout: Duration) -> Result<Frame, PipelineError>;

    /// Release the device.
    fn close(&mut self) {}

    /// Human readable name for logs.
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<(), PipelineError> {
        (**self).open()
    }

    fn read(&mut self, timeout: Duration) -> Result<Frame, PipelineError> {
        (**self).read(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
