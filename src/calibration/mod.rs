//! Camera-to-screen calibration.
//!
//! - [`homography`]: the projective transform and its estimation
//! - [`CalibrationEngine`]: compute, persist and load calibration data
//! - [`CalibrationSession`]: the point collection state machine

pub mod engine;
pub mod homography;
pub mod session;

use serde::{Deserialize, Serialize};

use crate::point::PixelPoint;

pub use engine::CalibrationEngine;
pub use homography::{Homography, RansacConfig};
pub use session::{CalibrationSession, CalibrationState, RecordOutcome};

/// Minimum number of correspondences for a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Calibration result as stored on disk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationData {
    /// Camera → screen transform; `None` when uncalibrated.
    pub homography: Option<Homography>,
    /// Camera-space correspondence points, in target order.
    pub camera_points: Vec<PixelPoint>,
    /// Screen-space target points, same length as `camera_points`.
    pub screen_points: Vec<PixelPoint>,
}

impl CalibrationData {
    pub fn uncalibrated() -> Self {
        Self::default()
    }

    pub fn is_calibrated(&self) -> bool {
        self.homography.is_some()
    }
}

/// Screen targets visited during calibration: the four corners clockwise
/// from top-left, then the center.
pub fn calibration_targets(width: u32, height: u32) -> Vec<PixelPoint> {
    let w = width.max(1) as i32;
    let h = height.max(1) as i32;
    vec![
        PixelPoint::new(0, 0),
        PixelPoint::new(w - 1, 0),
        PixelPoint::new(w - 1, h - 1),
        PixelPoint::new(0, h - 1),
        PixelPoint::new(w / 2, h / 2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_for_default_screen() {
        let targets = calibration_targets(1024, 768);
        assert_eq!(
            targets,
            vec![
                PixelPoint::new(0, 0),
                PixelPoint::new(1023, 0),
                PixelPoint::new(1023, 767),
                PixelPoint::new(0, 767),
                PixelPoint::new(512, 384),
            ]
        );
    }

    #[test]
    fn test_file_format() {
        let json = r#"{
            "homography": [[1.0, 0.0, 5.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            "camera_points": [[1, 2], [3, 4]],
            "screen_points": [[5, 6], [7, 8]]
        }"#;
        let data: CalibrationData = serde_json::from_str(json).unwrap();
        let h = data.homography.unwrap();
        assert_eq!(h.apply(PixelPoint::new(1, 1)).unwrap(), PixelPoint::new(6, 1));
        assert_eq!(data.camera_points[1], PixelPoint::new(3, 4));

        let uncalibrated: CalibrationData = serde_json::from_str(r#"{"homography": null}"#).unwrap();
        assert!(!uncalibrated.is_calibrated());
        assert!(uncalibrated.camera_points.is_empty());
    }
}
