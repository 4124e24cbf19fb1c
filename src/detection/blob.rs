//! Contour extraction and blob selection on a binary mask.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

/// Zeroth and first order moments of a closed polygon.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    /// Signed polygon moments via Green's theorem.
    pub fn of_polygon(points: &[[f64; 2]]) -> Self {
        let n = points.len();
        if n < 3 {
            return Self::default();
        }

        let mut m = Self::default();
        let mut prev = points[n - 1];
        for &cur in points {
            let cross = prev[0] * cur[1] - cur[0] * prev[1];
            m.m00 += cross;
            m.m10 += cross * (prev[0] + cur[0]);
            m.m01 += cross * (prev[1] + cur[1]);
            prev = cur;
        }
        m.m00 /= 2.0;
        m.m10 /= 6.0;
        m.m01 /= 6.0;
        m
    }

    /// Enclosed area (always non-negative).
    pub fn area(&self) -> f64 {
        self.m00.abs()
    }

    /// Centroid, or `None` for a zero-area polygon.
    pub fn centroid(&self) -> Option<[f64; 2]> {
        if self.m00 == 0.0 {
            return None;
        }
        Some([self.m10 / self.m00, self.m01 / self.m00])
    }
}

/// A contour that passed the area filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Contour area (px²).
    pub area: f64,
    pub moments: Moments,
}

impl Blob {
    pub fn centroid(&self) -> Option<[f64; 2]> {
        self.moments.centroid()
    }
}

/// Outer boundaries of top-level foreground regions, in scan order.
///
/// Regions nested inside holes of other regions are skipped.
pub fn external_contours(mask: &GrayImage) -> Vec<Vec<[f64; 2]>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points.iter().map(|p| [p.x as f64, p.y as f64]).collect())
        .collect()
}

/// Largest external contour with `min_area <= area <= max_area`.
///
/// Ties keep the contour found first in scan order.
pub fn largest_blob(mask: &GrayImage, min_area: f64, max_area: f64) -> Option<Blob> {
    let mut best: Option<Blob> = None;

    for contour in external_contours(mask) {
        let moments = Moments::of_polygon(&contour);
        let area = moments.area();
        if area < min_area || area > max_area {
            continue;
        }
        if best.as_ref().map_or(true, |b| area > b.area) {
            best = Some(Blob { area, moments });
        }
    }

    best
}
