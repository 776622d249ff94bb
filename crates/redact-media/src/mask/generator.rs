//! Feathered rounded-rectangle alpha masks.
//!
//! A mask is a single-channel image whose intensity is the blend weight
//! between the blurred and the original pixels. It is a (possibly rounded)
//! rectangle slightly larger than the detection, softened with a Gaussian
//! blur so the blurred patch fades into the untouched frame.

use std::sync::Arc;

use image::{imageops, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use super::{CornerRatio, MaskEntry};

/// Supersampling grid per axis used when rasterizing the shape.
const SUPERSAMPLE: u32 = 4;

/// Builds masks on cache misses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskGenerator {
    /// Gaussian sigma used to feather the mask edge, in pixels (default: 5.0)
    pub blur_radius: f64,
    /// Margin added around a detection as a fraction of its size, capped at
    /// twice the blur radius (default: 0.5)
    pub boost_factor: f64,
}

impl Default for MaskGenerator {
    fn default() -> Self {
        Self {
            blur_radius: 5.0,
            boost_factor: 0.5,
        }
    }
}

impl MaskGenerator {
    pub fn new(blur_radius: f64, boost_factor: f64) -> Self {
        Self {
            blur_radius,
            boost_factor,
        }
    }

    /// Margin added on each side of a detection dimension.
    ///
    /// Small detections get a proportionally small margin so their masks do
    /// not balloon.
    #[inline]
    pub fn margin(&self, dimension: u32) -> f64 {
        (2.0 * self.blur_radius).min(self.boost_factor * dimension as f64)
    }

    /// Render the mask for a (quantized) detection size.
    ///
    /// The returned offsets place the mask relative to the detection's
    /// top-left corner: the mask origin is `offset` pixels up and left of it.
    pub fn generate(&self, width: u32, height: u32, corner_ratio: CornerRatio) -> MaskEntry {
        let radius = self.blur_radius;
        let margin_x = self.margin(width);
        let margin_y = self.margin(height);

        let mask_width = width as f64 + 2.0 * margin_x;
        let mask_height = height as f64 + 2.0 * margin_y;

        let ratio = corner_ratio.value() as f64;
        let shape = RoundedRect {
            left: radius,
            top: radius,
            right: radius + mask_width,
            bottom: radius + mask_height,
            rx: mask_width / 2.0 * ratio,
            ry: mask_height / 2.0 * ratio,
        };

        let canvas_width = (mask_width + 2.0 * radius).ceil() as u32;
        let canvas_height = (mask_height + 2.0 * radius).ceil() as u32;
        let canvas = rasterize(&shape, canvas_width, canvas_height);

        let mask = if radius > 0.0 {
            imageops::blur(&canvas, radius as f32)
        } else {
            canvas
        };

        MaskEntry {
            offset_x: (margin_x + radius) as i32,
            offset_y: (margin_y + radius) as i32,
            mask: Arc::new(mask),
        }
    }
}

/// Axis-aligned rectangle with elliptical corners.
#[derive(Debug, Clone, Copy)]
struct RoundedRect {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
    rx: f64,
    ry: f64,
}

impl RoundedRect {
    fn contains(&self, x: f64, y: f64) -> bool {
        if x < self.left || x > self.right || y < self.top || y > self.bottom {
            return false;
        }
        if self.rx <= 0.0 || self.ry <= 0.0 {
            return true;
        }

        // Nearest point of the inner rectangle spanned by the corner centers
        let cx = x.clamp(self.left + self.rx, self.right - self.rx);
        let cy = y.clamp(self.top + self.ry, self.bottom - self.ry);
        let dx = (x - cx) / self.rx;
        let dy = (y - cy) / self.ry;
        dx * dx + dy * dy <= 1.0
    }
}

/// Anti-aliased fill of `shape` (white) on a black canvas.
fn rasterize(shape: &RoundedRect, width: u32, height: u32) -> GrayImage {
    let step = 1.0 / SUPERSAMPLE as f64;
    let samples = (SUPERSAMPLE * SUPERSAMPLE) as f64;

    GrayImage::from_fn(width, height, |px, py| {
        let (x0, y0) = (px as f64, py as f64);
        let (x1, y1) = (x0 + 1.0, y0 + 1.0);

        // The shape is convex: all four pixel corners inside means full coverage
        if shape.contains(x0, y0)
            && shape.contains(x1, y0)
            && shape.contains(x0, y1)
            && shape.contains(x1, y1)
        {
            return Luma([255]);
        }

        let mut covered = 0u32;
        for sy in 0..SUPERSAMPLE {
            for sx in 0..SUPERSAMPLE {
                let x = x0 + (sx as f64 + 0.5) * step;
                let y = y0 + (sy as f64 + 0.5) * step;
                if shape.contains(x, y) {
                    covered += 1;
                }
            }
        }
        Luma([(covered as f64 / samples * 255.0).round() as u8])
    })
}
