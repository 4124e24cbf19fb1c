//! Laser dot detection.
//!
//! Pipeline per frame: HSV threshold (two ranges, for red hue wrap-around),
//! morphological open then close, largest external contour inside the area
//! bounds, centroid from moments, exponential moving average.

pub mod blob;
pub mod hsv;
pub mod morphology;

use std::time::Instant;

use image::imageops::FilterType;
use image::{GrayImage, RgbImage};

use crate::camera::Frame;
use crate::config::LaserProfile;
use crate::point::PixelPoint;

use self::morphology::Kernel;

/// Mask preview dimensions for diagnostic overlays.
pub const MASK_PREVIEW_SIZE: (u32, u32) = (160, 120);

/// Result of processing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Smoothed dot position in camera pixels; `None` when no blob qualified.
    pub point: Option<PixelPoint>,
    /// Area of the selected contour (px²), 0 on a miss.
    pub area: f64,
    /// `min(1, area / max(min_area, 1))`, 0 on a miss.
    pub confidence: f64,
    /// Capture time of the frame.
    pub timestamp: Instant,
}

impl Detection {
    pub fn miss(timestamp: Instant) -> Self {
        Self {
            point: None,
            area: 0.0,
            confidence: 0.0,
            timestamp,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.point.is_some()
    }
}

/// EMA filter state carried between frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothingState {
    point: Option<[f64; 2]>,
}

impl SmoothingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current smoothed position, if seeded.
    pub fn value(&self) -> Option<[f64; 2]> {
        self.point
    }

    /// Feed a raw sample. The first sample seeds the filter unchanged.
    pub fn update(&self, raw: [f64; 2], alpha: f64) -> SmoothingState {
        let next = match self.point {
            None => raw,
            Some(prior) => [
                alpha * raw[0] + (1.0 - alpha) * prior[0],
                alpha * raw[1] + (1.0 - alpha) * prior[1],
            ],
        };
        SmoothingState { point: Some(next) }
    }

    pub fn reset(&mut self) {
        self.point = None;
    }
}

/// Detect the laser dot in an already thresholded mask.
///
/// Applies morphology, blob selection and smoothing. A miss leaves the
/// smoothing state untouched.
pub fn detect_mask(
    mask: &GrayImage,
    profile: &LaserProfile,
    prior: SmoothingState,
    timestamp: Instant,
) -> (Detection, SmoothingState) {
    let kernel = Kernel::ellipse(profile.morph_kernel);
    let cleaned = morphology::close(&morphology::open(mask, &kernel), &kernel);
    detect_cleaned(&cleaned, profile, prior, timestamp)
}

fn detect_cleaned(
    cleaned: &GrayImage,
    profile: &LaserProfile,
    prior: SmoothingState,
    timestamp: Instant,
) -> (Detection, SmoothingState) {
    let Some(blob) = blob::largest_blob(cleaned, profile.min_area as f64, profile.max_area as f64) else {
        return (Detection::miss(timestamp), prior);
    };
    let Some(centroid) = blob.centroid() else {
        log::trace!("Selected contour has zero area, treating as miss");
        return (Detection::miss(timestamp), prior);
    };

    let state = prior.update(centroid, profile.ema_alpha);
    let point = state
        .value()
        .and_then(|p| PixelPoint::from_f64(p[0], p[1]));

    let confidence = (blob.area / (profile.min_area.max(1) as f64)).min(1.0);

    (
        Detection {
            point,
            area: blob.area,
            confidence,
            timestamp,
        },
        state,
    )
}

/// Detect the laser dot in an RGB frame.
pub fn detect(frame: &Frame, profile: &LaserProfile, prior: SmoothingState) -> (Detection, SmoothingState) {
    let mask = hsv::laser_mask(&frame.image, profile);
    detect_mask(&mask, profile, prior, frame.timestamp)
}

/// Stateful detector owning its smoothing state.
///
/// Owned by whichever task runs detection; not shared.
pub struct LaserDetector {
    profile: LaserProfile,
    kernel: Kernel,
    smoothing: SmoothingState,
    keep_mask: bool,
    last_mask: Option<GrayImage>,
}

impl LaserDetector {
    pub fn new(profile: LaserProfile) -> Self {
        let kernel = Kernel::ellipse(profile.morph_kernel);
        Self {
            profile,
            kernel,
            smoothing: SmoothingState::new(),
            keep_mask: false,
            last_mask: None,
        }
    }

    /// Retain the cleaned mask of the last frame for [`Self::mask_preview`].
    pub fn with_mask_preview(mut self, keep: bool) -> Self {
        self.keep_mask = keep;
        self
    }

    pub fn profile(&self) -> &LaserProfile {
        &self.profile
    }

    /// Swap in a new profile after an explicit settings change.
    pub fn set_profile(&mut self, profile: LaserProfile) {
        self.kernel = Kernel::ellipse(profile.morph_kernel);
        self.profile = profile;
    }

    pub fn set_keep_mask(&mut self, keep: bool) {
        self.keep_mask = keep;
        if !keep {
            self.last_mask = None;
        }
    }

    pub fn smoothing(&self) -> SmoothingState {
        self.smoothing
    }

    /// Forget the smoothed position (e.g. after switching cameras).
    pub fn reset(&mut self) {
        self.smoothing.reset();
        self.last_mask = None;
    }

    pub fn process(&mut self, frame: &Frame) -> Detection {
        self.process_image(&frame.image, frame.timestamp)
    }

    pub fn process_image(&mut self, image: &RgbImage, timestamp: Instant) -> Detection {
        let mask = hsv::laser_mask(image, &self.profile);
        let cleaned = morphology::close(&morphology::open(&mask, &self.kernel), &self.kernel);

        let (detection, state) = detect_cleaned(&cleaned, &self.profile, self.smoothing, timestamp);
        self.smoothing = state;
        if self.keep_mask {
            self.last_mask = Some(cleaned);
        }

        match detection.point {
            Some(p) => log::trace!(
                "Laser at {} (area {:.1}, confidence {:.2})",
                p,
                detection.area,
                detection.confidence
            ),
            None => log::trace!("No laser blob"),
        }
        detection
    }

    /// Downscaled copy of the last cleaned mask.
    pub fn mask_preview(&self) -> Option<GrayImage> {
        self.last_mask.as_ref().map(|mask| {
            let (w, h) = MASK_PREVIEW_SIZE;
            image::imageops::resize(mask, w, h, FilterType::Nearest)
        })
    }
}
