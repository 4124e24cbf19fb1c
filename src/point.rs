//! Integer pixel coordinates shared by camera and screen space.

use serde::{Deserialize, Serialize};

/// A pixel position. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &PixelPoint) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn to_f64(self) -> [f64; 2] {
        [self.x as f64, self.y as f64]
    }

    /// Round a floating point position to the nearest pixel.
    ///
    /// Returns `None` for non-finite input or values outside `i32`.
    pub fn from_f64(x: f64, y: f64) -> Option<Self> {
        let (rx, ry) = (x.round(), y.round());
        let range = i32::MIN as f64..=i32::MAX as f64;
        if !rx.is_finite() || !ry.is_finite() || !range.contains(&rx) || !range.contains(&ry) {
            return None;
        }
        Some(Self::new(rx as i32, ry as i32))
    }
}

impl From<[i32; 2]> for PixelPoint {
    fn from(p: [i32; 2]) -> Self {
        Self::new(p[0], p[1])
    }
}

impl From<PixelPoint> for [i32; 2] {
    fn from(p: PixelPoint) -> Self {
        [p.x, p.y]
    }
}

impl From<(i32, i32)> for PixelPoint {
    fn from(p: (i32, i32)) -> Self {
        Self::new(p.0, p.1)
    }
}

impl std::fmt::Display for PixelPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
