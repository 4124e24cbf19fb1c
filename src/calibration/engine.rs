//! Compute, persist and load calibration data.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::homography::{estimate_dlt, fit_ransac, Homography, RansacConfig};
use super::{CalibrationData, MIN_CORRESPONDENCES};
use crate::config::persist;
use crate::error::PipelineError;
use crate::point::PixelPoint;

/// Owns the calibration file and the solver configuration.
pub struct CalibrationEngine {
    path: PathBuf,
    ransac: RansacConfig,
}

impl CalibrationEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ransac: RansacConfig::default(),
        }
    }

    pub fn with_ransac(mut self, ransac: RansacConfig) -> Self {
        self.ransac = ransac;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Solve for the camera → screen homography and persist it.
    ///
    /// The file on disk is only replaced after a successful solve, so a
    /// failed attempt leaves the previous calibration in place.
    pub fn compute(
        &self,
        camera_points: &[PixelPoint],
        screen_points: &[PixelPoint],
    ) -> Result<CalibrationData, PipelineError> {
        check_correspondences(camera_points, screen_points)?;

        let src: Vec<[f64; 2]> = camera_points.iter().map(|p| p.to_f64()).collect();
        let dst: Vec<[f64; 2]> = screen_points.iter().map(|p| p.to_f64()).collect();

        log::info!("Computing homography from {} point pairs", src.len());

        let homography = match fit_ransac(&src, &dst, &self.ransac) {
            Some(fit) if fit.n_inliers >= MIN_CORRESPONDENCES => {
                log::info!(
                    "Homography computed: {}/{} inliers (threshold {:.1}px)",
                    fit.n_inliers,
                    src.len(),
                    self.ransac.inlier_threshold
                );
                fit.homography
            }
            _ => {
                log::warn!("RANSAC found no consensus, falling back to least squares over all points");
                estimate_dlt(&src, &dst).map_err(|e| match e {
                    PipelineError::CalibrationSolveFailure(_) => e,
                    other => PipelineError::CalibrationSolveFailure(other.to_string()),
                })?
            }
        };

        let data = CalibrationData {
            homography: Some(homography),
            camera_points: camera_points.to_vec(),
            screen_points: screen_points.to_vec(),
        };
        persist::save_json_atomic(&self.path, &data)?;
        log::info!("Calibration saved to {}", self.path.display());
        Ok(data)
    }

    /// Load the persisted calibration.
    ///
    /// Missing or corrupt files yield uncalibrated data; a corrupt file is
    /// moved aside first. Never fails.
    pub fn load(&self) -> CalibrationData {
        match persist::load_json_or_backup::<CalibrationData>(&self.path) {
            Ok(Some(data)) => {
                if data.camera_points.len() != data.screen_points.len() {
                    log::warn!(
                        "Calibration point count mismatch ({} camera, {} screen); using stored matrix anyway",
                        data.camera_points.len(),
                        data.screen_points.len()
                    );
                }
                if data.is_calibrated() {
                    log::info!("Loaded calibration from {}", self.path.display());
                }
                data
            }
            Ok(None) => {
                log::info!("No calibration at {}, running uncalibrated", self.path.display());
                CalibrationData::uncalibrated()
            }
            Err(e) => {
                log::warn!("Discarding calibration: {}", e);
                CalibrationData::uncalibrated()
            }
        }
    }

    /// Map a camera point to screen space.
    pub fn apply(homography: &Homography, point: PixelPoint) -> Result<PixelPoint, PipelineError> {
        homography.apply(point)
    }
}

fn check_correspondences(camera: &[PixelPoint], screen: &[PixelPoint]) -> Result<(), PipelineError> {
    if camera.len() != screen.len() || camera.len() < MIN_CORRESPONDENCES {
        return Err(PipelineError::InsufficientCorrespondences {
            needed: MIN_CORRESPONDENCES,
            got: camera.len().min(screen.len()),
        });
    }

    let distinct_camera = camera.iter().collect::<HashSet<_>>().len();
    let distinct_screen = screen.iter().collect::<HashSet<_>>().len();
    let distinct = distinct_camera.min(distinct_screen);
    if distinct < MIN_CORRESPONDENCES {
        return Err(PipelineError::InsufficientCorrespondences {
            needed: MIN_CORRESPONDENCES,
            got: distinct,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::calibration_targets;
    use nalgebra::Matrix3;

    fn engine(dir: &tempfile::TempDir) -> CalibrationEngine {
        CalibrationEngine::new(dir.path().join("calibration.json"))
    }

    /// Camera points that map onto `screen` under a mild perspective warp.
    fn observed_points(screen: &[PixelPoint]) -> Vec<PixelPoint> {
        let screen_to_camera = Homography::from_matrix(Matrix3::new(
            0.55, 0.03, 60.0,
            -0.02, 0.52, 45.0,
            0.00004, -0.00003, 1.0,
        ))
        .unwrap();
        screen.iter().map(|p| screen_to_camera.apply(*p).unwrap()).collect()
    }

    #[test]
    fn test_round_trip_within_two_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let screen = calibration_targets(1024, 768);
        let camera = observed_points(&screen);

        let data = engine.compute(&camera, &screen).unwrap();
        let h = data.homography.unwrap();
        for (c, s) in camera.iter().zip(&screen) {
            let mapped = CalibrationEngine::apply(&h, *c).unwrap();
            assert!((mapped.x - s.x).abs() <= 2, "{} -> {} (want {})", c, mapped, s);
            assert!((mapped.y - s.y).abs() <= 2, "{} -> {} (want {})", c, mapped, s);
        }
        assert!(engine.path().exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let screen = calibration_targets(800, 600);
        let camera = observed_points(&screen);

        let computed = engine.compute(&camera, &screen).unwrap();
        let loaded = engine.load();
        assert_eq!(loaded.camera_points, computed.camera_points);
        assert_eq!(loaded.screen_points, computed.screen_points);
        assert!(loaded.is_calibrated());
    }

    #[test]
    fn test_degenerate_input_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let screen = calibration_targets(1024, 768);
        engine.compute(&observed_points(&screen), &screen).unwrap();
        let before = std::fs::read(engine.path()).unwrap();

        // Only two distinct camera positions
        let camera = vec![
            PixelPoint::new(10, 10),
            PixelPoint::new(10, 10),
            PixelPoint::new(10, 10),
            PixelPoint::new(50, 50),
            PixelPoint::new(50, 50),
        ];
        let err = engine.compute(&camera, &screen).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientCorrespondences { needed: 4, got: 2 }));
        assert_eq!(std::fs::read(engine.path()).unwrap(), before);
    }

    #[test]
    fn test_duplicate_screen_points_keep_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let targets = calibration_targets(1024, 768);
        engine.compute(&observed_points(&targets), &targets).unwrap();
        let before = std::fs::read(engine.path()).unwrap();

        // Five distinct camera points, but only three distinct screen targets
        let camera = observed_points(&targets);
        let screen = vec![targets[0], targets[1], targets[2], targets[0], targets[1]];
        let err = engine.compute(&camera, &screen).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientCorrespondences { needed: 4, got: 3 }));
        assert_eq!(std::fs::read(engine.path()).unwrap(), before);
    }

    #[test]
    fn test_too_few_points() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let pts = [PixelPoint::new(0, 0), PixelPoint::new(1, 0), PixelPoint::new(0, 1)];
        assert!(matches!(
            engine.compute(&pts, &pts),
            Err(PipelineError::InsufficientCorrespondences { got: 3, .. })
        ));
        assert!(!engine.path().exists());
    }

    #[test]
    fn test_missing_file_is_uncalibrated() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(engine(&dir).load(), CalibrationData::uncalibrated());
    }

    #[test]
    fn test_corrupt_file_is_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        std::fs::write(engine.path(), "{ not json").unwrap();

        let data = engine.load();
        assert!(!data.is_calibrated());
        assert!(!engine.path().exists());
        let backup = dir.path().join("calibration.json.bak");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "{ not json");
    }

    #[test]
    fn test_count_mismatch_still_returns_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        std::fs::write(
            engine.path(),
            r#"{"homography": [[1,0,0],[0,1,0],[0,0,1]], "camera_points": [[1,1]], "screen_points": []}"#,
        )
        .unwrap();

        let data = engine.load();
        assert!(data.is_calibrated());
        assert_eq!(data.camera_points.len(), 1);
        assert!(data.screen_points.is_empty());
    }
}
