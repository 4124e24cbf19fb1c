//! Calibration session state machine.
//!
//! The user dwells on each screen target in turn; every dwell click records
//! the camera-space laser position for that target. After the last target
//! the engine solves, persists and the mapper adopts the new matrix.

use super::{calibration_targets, CalibrationData, CalibrationEngine};
use crate::error::PipelineError;
use crate::mapping::CoordinateMapper;
use crate::point::PixelPoint;

/// State of the calibration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// No session running and no matrix adopted by this session.
    Uncalibrated,
    /// Collecting camera points; `collected` of `total` recorded so far.
    Collecting { collected: usize, total: usize },
    /// The last session produced a matrix now in use.
    Calibrated,
}

impl CalibrationState {
    pub fn is_collecting(&self) -> bool {
        matches!(self, CalibrationState::Collecting { .. })
    }
}

impl std::fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationState::Uncalibrated => write!(f, "Uncalibrated"),
            CalibrationState::Collecting { collected, total } => {
                write!(f, "Point {} / {}", collected + 1, total)
            }
            CalibrationState::Calibrated => write!(f, "Calibrated"),
        }
    }
}

/// What a recorded click did.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// No session running; the click was not used.
    Ignored,
    /// Point stored, more targets remain.
    Collected { collected: usize, total: usize },
    /// Final point stored and the new calibration adopted.
    Completed(CalibrationData),
}

/// Collects one camera point per screen target.
pub struct CalibrationSession {
    targets: Vec<PixelPoint>,
    camera_points: Vec<PixelPoint>,
    state: CalibrationState,
}

impl CalibrationSession {
    pub fn new(targets: Vec<PixelPoint>, calibrated: bool) -> Self {
        Self {
            targets,
            camera_points: Vec::new(),
            state: if calibrated {
                CalibrationState::Calibrated
            } else {
                CalibrationState::Uncalibrated
            },
        }
    }

    /// Session with the standard five targets for a screen size.
    pub fn for_screen(width: u32, height: u32, calibrated: bool) -> Self {
        Self::new(calibration_targets(width, height), calibrated)
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn targets(&self) -> &[PixelPoint] {
        &self.targets
    }

    /// Replace the targets (screen size changed). Aborts a running session.
    pub fn set_targets(&mut self, targets: Vec<PixelPoint>) {
        if self.state.is_collecting() {
            self.abort();
        }
        self.targets = targets;
    }

    /// Begin (or restart) collecting. The serving matrix stays in use until
    /// a new one replaces it.
    pub fn start(&mut self) {
        self.camera_points.clear();
        self.state = CalibrationState::Collecting {
            collected: 0,
            total: self.targets.len(),
        };
        log::info!("Starting calibration with {} targets", self.targets.len());
    }

    pub fn abort(&mut self) {
        if self.state.is_collecting() {
            self.camera_points.clear();
            self.state = CalibrationState::Uncalibrated;
            log::info!("Calibration cancelled");
        }
    }

    /// Screen target the user should point at next.
    pub fn target(&self) -> Option<PixelPoint> {
        match self.state {
            CalibrationState::Collecting { collected, .. } => self.targets.get(collected).copied(),
            _ => None,
        }
    }

    /// `(collected, total)` while collecting.
    pub fn progress(&self) -> Option<(usize, usize)> {
        match self.state {
            CalibrationState::Collecting { collected, total } => Some((collected, total)),
            _ => None,
        }
    }

    /// Record the camera-space position of a dwell click on the current
    /// target.
    ///
    /// On the last target the engine solves and persists; on success the
    /// mapper adopts the matrix. On failure the session drops back to
    /// `Uncalibrated` and the mapper keeps serving its previous matrix.
    pub fn record(
        &mut self,
        camera_point: PixelPoint,
        engine: &CalibrationEngine,
        mapper: &CoordinateMapper,
    ) -> Result<RecordOutcome, PipelineError> {
        let CalibrationState::Collecting { total, .. } = self.state else {
            return Ok(RecordOutcome::Ignored);
        };

        self.camera_points.push(camera_point);
        let collected = self.camera_points.len();
        log::info!("Calibration point {}/{} at camera {}", collected, total, camera_point);

        if collected < total {
            self.state = CalibrationState::Collecting { collected, total };
            return Ok(RecordOutcome::Collected { collected, total });
        }

        let camera_points = std::mem::take(&mut self.camera_points);
        match engine.compute(&camera_points, &self.targets) {
            Ok(data) => {
                mapper.adopt(&data);
                self.state = CalibrationState::Calibrated;
                Ok(RecordOutcome::Completed(data))
            }
            Err(e) => {
                log::error!("Calibration failed: {}", e);
                self.state = CalibrationState::Uncalibrated;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Homography;
    use nalgebra::Matrix3;

    fn setup(dir: &tempfile::TempDir) -> (CalibrationSession, CalibrationEngine, CoordinateMapper) {
        (
            CalibrationSession::for_screen(640, 480, false),
            CalibrationEngine::new(dir.path().join("calibration.json")),
            CoordinateMapper::new(),
        )
    }

    fn camera_for(target: PixelPoint) -> PixelPoint {
        // Camera sees the screen at half scale, offset by (40, 30)
        PixelPoint::new(target.x / 2 + 40, target.y / 2 + 30)
    }

    #[test]
    fn test_collects_all_targets_then_adopts() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, engine, mapper) = setup(&dir);
        assert!(!mapper.is_calibrated());

        session.start();
        assert_eq!(session.progress(), Some((0, 5)));

        for i in 0..5 {
            let target = session.target().unwrap();
            let outcome = session.record(camera_for(target), &engine, &mapper).unwrap();
            if i < 4 {
                assert_eq!(outcome, RecordOutcome::Collected { collected: i + 1, total: 5 });
            } else {
                assert!(matches!(outcome, RecordOutcome::Completed(_)));
            }
        }

        assert_eq!(session.state(), CalibrationState::Calibrated);
        assert!(session.target().is_none());
        let mapped = mapper.map(Some(PixelPoint::new(200, 150))).unwrap();
        assert!((mapped.x - 320).abs() <= 2);
        assert!((mapped.y - 240).abs() <= 2);
    }

    #[test]
    fn test_clicks_outside_a_session_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, engine, mapper) = setup(&dir);
        let outcome = session.record(PixelPoint::new(1, 1), &engine, &mapper).unwrap();
        assert_eq!(outcome, RecordOutcome::Ignored);
        assert_eq!(session.state(), CalibrationState::Uncalibrated);
    }

    #[test]
    fn test_abort_keeps_previous_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, engine, mapper) = setup(&dir);
        let previous = Homography::from_matrix(Matrix3::new(2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0)).unwrap();
        mapper.set_homography(Some(previous));

        session.start();
        session.record(PixelPoint::new(40, 30), &engine, &mapper).unwrap();
        session.abort();

        assert_eq!(session.state(), CalibrationState::Uncalibrated);
        assert_eq!(mapper.current().as_deref(), Some(&previous));
    }

    #[test]
    fn test_failed_solve_keeps_previous_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, engine, mapper) = setup(&dir);
        let previous = Homography::identity();
        mapper.set_homography(Some(previous));

        session.start();
        // The laser never moved: every target gets the same camera point
        for _ in 0..5 {
            let result = session.record(PixelPoint::new(100, 100), &engine, &mapper);
            if session.state().is_collecting() {
                assert!(result.is_ok());
            } else {
                assert!(matches!(result, Err(PipelineError::InsufficientCorrespondences { .. })));
            }
        }

        assert_eq!(session.state(), CalibrationState::Uncalibrated);
        assert_eq!(mapper.current().as_deref(), Some(&previous));
        assert!(!engine.path().exists());
    }
}
