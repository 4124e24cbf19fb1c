//! Binary morphology with an elliptical structuring element.

use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_close, grayscale_open, Mask};

/// Elliptical structuring element, anchored at its center.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    size: u32,
    cells: usize,
    mask: Mask,
}

impl Kernel {
    /// Elliptical kernel inscribed in a `size × size` box. A size of 3 gives
    /// the classic cross.
    pub fn ellipse(size: u32) -> Self {
        let shape = ellipse_image(size.clamp(1, 511));
        let size = shape.width();
        let c = (size / 2) as u8;
        let cells = shape.pixels().filter(|p| p[0] != 0).count();

        Self {
            size,
            cells,
            mask: Mask::from_image(&shape, c, c),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn cell_count(&self) -> usize {
        self.cells
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }
}

/// Render the ellipse footprint as a `size × size` image, 255 on active cells.
fn ellipse_image(size: u32) -> GrayImage {
    let r = (size / 2) as i32;
    let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };
    let mut image = GrayImage::new(size, size);

    for i in 0..size as i32 {
        let dy = i - r;
        let dx = (r as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i32;
        let j1 = (r - dx).max(0);
        let j2 = (r + dx + 1).min(size as i32);
        for j in j1..j2 {
            image.put_pixel(j as u32, i as u32, Luma([255]));
        }
    }

    image
}

/// Erode then dilate: removes specks smaller than the kernel.
pub fn open(mask: &GrayImage, kernel: &Kernel) -> GrayImage {
    grayscale_open(mask, &kernel.mask)
}

/// Dilate then erode: fills gaps smaller than the kernel.
pub fn close(mask: &GrayImage, kernel: &Kernel) -> GrayImage {
    grayscale_close(mask, &kernel.mask)
}
