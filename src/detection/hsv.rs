//! RGB to HSV conversion and dual-range color thresholding.
//!
//! Uses the 8-bit HSV convention common to machine vision tooling: hue is
//! halved into `[0, 180]`, saturation and value span `[0, 255]`.

use image::{GrayImage, Luma, RgbImage};

use crate::config::{Hsv, LaserProfile};

/// Mask value for foreground pixels.
pub const MASK_ON: u8 = 255;

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> Hsv {
    let r = rgb[0] as f32;
    let g = rgb[1] as f32;
    let b = rgb[2] as f32;

    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };

    let h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [
        (h / 2.0).round().clamp(0.0, 180.0) as u8,
        s.round().clamp(0.0, 255.0) as u8,
        v as u8,
    ]
}

/// Inclusive per-channel range test.
#[inline]
pub fn in_range(hsv: Hsv, lower: Hsv, upper: Hsv) -> bool {
    (0..3).all(|c| hsv[c] >= lower[c] && hsv[c] <= upper[c])
}

/// Binary mask of pixels matching either of the profile's HSV ranges.
pub fn laser_mask(frame: &RgbImage, profile: &LaserProfile) -> GrayImage {
    let (width, height) = frame.dimensions();
    let mut mask = GrayImage::new(width, height);

    for (x, y, pixel) in frame.enumerate_pixels() {
        let hsv = rgb_to_hsv(pixel.0);
        if in_range(hsv, profile.lower1, profile.upper1) || in_range(hsv, profile.lower2, profile.upper2) {
            mask.put_pixel(x, y, Luma([MASK_ON]));
        }
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_primary_colors() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv([128, 128, 128]), [0, 0, 128]);
    }

    #[test]
    fn test_red_wraps_near_180() {
        // Slightly magenta-leaning red lands at the top of the hue range
        let hsv = rgb_to_hsv([255, 0, 20]);
        assert!(hsv[0] >= 170, "hue {}", hsv[0]);
    }

    #[test]
    fn test_mask_uses_both_ranges() {
        let profile = LaserProfile::default();
        let mut frame = RgbImage::from_pixel(3, 1, Rgb([0, 0, 0]));
        frame.put_pixel(0, 0, Rgb([255, 10, 0])); // low hue red
        frame.put_pixel(1, 0, Rgb([255, 0, 20])); // high hue red
        frame.put_pixel(2, 0, Rgb([0, 255, 0])); // green

        let mask = laser_mask(&frame, &profile);
        assert_eq!(mask.get_pixel(0, 0)[0], MASK_ON);
        assert_eq!(mask.get_pixel(1, 0)[0], MASK_ON);
        assert_eq!(mask.get_pixel(2, 0)[0], 0);
    }
}
