//! Error taxonomy for the detection, calibration and capture pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the pointer pipeline.
///
/// Detection and mapping problems never show up here; they degrade to
/// "no point" for the tick. Only capture and persistence failures, and
/// explicit calibration attempts, produce errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("frame read failed: {0}")]
    FrameReadError(String),
    #[error("frame source exhausted")]
    EndOfStream,
    #[error("insufficient correspondences: need {needed} distinct point pairs, got {got}")]
    InsufficientCorrespondences { needed: usize, got: usize },
    #[error("homography solve failed: {0}")]
    CalibrationSolveFailure(String),
    #[error("degenerate transform (w = {w:e})")]
    DegenerateTransform { w: f64 },
    #[error("corrupt persisted state in {path}: {reason}")]
    CorruptPersistedState { path: PathBuf, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether the error comes from frame acquisition (camera open/read).
    pub fn is_capture_error(&self) -> bool {
        matches!(
            self,
            PipelineError::CameraUnavailable(_)
                | PipelineError::FrameReadError(_)
                | PipelineError::EndOfStream
        )
    }
}
