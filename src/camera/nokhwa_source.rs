//! Native webcam source using the nokhwa crate.

use std::time::Duration;

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use super::{Frame, FrameSource};
use crate::config::CameraConfig;
use crate::error::PipelineError;

/// Webcam frame source.
///
/// `read` blocks until the driver delivers a frame; run it behind a
/// [`super::CaptureThread`] to get a bounded wait.
pub struct NokhwaSource {
    config: CameraConfig,
    camera: Option<Camera>,
    frame_count: u64,
}

impl NokhwaSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            camera: None,
            frame_count: 0,
        }
    }

    fn open_camera(&self) -> Result<Camera, nokhwa::NokhwaError> {
        let index = CameraIndex::Index(self.config.device_index);

        // Prefer the configured format, fall back to whatever the driver offers
        let preferred = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(self.config.width, self.config.height),
            FrameFormat::MJPEG,
            self.config.fps,
        )));

        match Camera::new(index.clone(), preferred) {
            Ok(camera) => Ok(camera),
            Err(e) => {
                log::warn!("Configured camera format rejected: {:?}", e);
                Camera::new(index, RequestedFormat::new::<RgbFormat>(RequestedFormatType::None))
            }
        }
    }
}

impl FrameSource for NokhwaSource {
    fn open(&mut self) -> Result<(), PipelineError> {
        let mut camera = self
            .open_camera()
            .map_err(|e| PipelineError::CameraUnavailable(format!("{:?}", e)))?;
        camera
            .open_stream()
            .map_err(|e| PipelineError::CameraUnavailable(format!("failed to open stream: {:?}", e)))?;

        log::info!(
            "Camera opened: {} ({}x{} @ {}fps)",
            camera.info().human_name(),
            camera.resolution().width(),
            camera.resolution().height(),
            camera.frame_rate()
        );
        self.camera = Some(camera);
        Ok(())
    }

    // nokhwa's frame() blocks until the driver delivers; CaptureThread::stop
    // bounds shutdown instead of the timeout
    fn read(&mut self, _timeout: Duration) -> Result<Frame, PipelineError> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| PipelineError::FrameReadError("camera not opened".to_string()))?;

        let buffer = camera
            .frame()
            .map_err(|e| PipelineError::FrameReadError(format!("{:?}", e)))?;
        let width = buffer.resolution().width();
        let height = buffer.resolution().height();
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| PipelineError::FrameReadError(format!("decode failed: {:?}", e)))?;

        let image = RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| PipelineError::FrameReadError("frame buffer size mismatch".to_string()))?;

        self.frame_count += 1;
        Ok(Frame::new(image, self.frame_count))
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("Failed to stop camera stream: {:?}", e);
            }
            log::info!("Camera stopped");
        }
    }

    fn describe(&self) -> String {
        format!(
            "camera {} ({}x{} @ {}fps)",
            self.config.device_index, self.config.width, self.config.height, self.config.fps
        )
    }
}

impl Drop for NokhwaSource {
    fn drop(&mut self) {
        self.close();
    }
}
