//! Camera → screen point mapping.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::calibration::{CalibrationData, Homography};
use crate::point::PixelPoint;

/// Applies the current calibration to detected points.
///
/// Cloning shares the underlying transform. The homography is replaced as
/// a whole value, so a reader sees either the old or the new matrix.
#[derive(Clone, Default)]
pub struct CoordinateMapper {
    homography: Arc<RwLock<Option<Arc<Homography>>>>,
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_calibration(data: &CalibrationData) -> Self {
        let mapper = Self::new();
        mapper.set_homography(data.homography);
        mapper
    }

    /// Adopt a new transform (or clear it with `None`).
    pub fn set_homography(&self, homography: Option<Homography>) {
        *self.homography.write() = homography.map(Arc::new);
    }

    /// Adopt the matrix from a calibration result. Uncalibrated data leaves
    /// the current matrix in place.
    pub fn adopt(&self, data: &CalibrationData) {
        if let Some(h) = data.homography {
            self.set_homography(Some(h));
        }
    }

    pub fn current(&self) -> Option<Arc<Homography>> {
        self.homography.read().clone()
    }

    pub fn is_calibrated(&self) -> bool {
        self.homography.read().is_some()
    }

    /// Map a detected point to screen space.
    ///
    /// Without a calibration the point passes through unchanged. A
    /// degenerate projection drops the point for this tick.
    pub fn map(&self, point: Option<PixelPoint>) -> Option<PixelPoint> {
        let point = point?;
        let Some(h) = self.current() else {
            return Some(point);
        };
        match h.apply(point) {
            Ok(mapped) => Some(mapped),
            Err(e) => {
                log::debug!("Dropping point {}: {}", point, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for CoordinateMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateMapper")
            .field("calibrated", &self.is_calibrated())
            .finish()
    }
}
