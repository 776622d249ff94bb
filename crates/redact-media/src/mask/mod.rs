//! Precomputed feathered masks.
//!
//! Masks are expensive to build relative to compositing, and detections of
//! near-identical size repeat from frame to frame, so they are memoized in a
//! process-wide [`MaskCache`] keyed by quantized size and corner ratio.

pub mod cache;
pub mod generator;
mod reclaim;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use image::GrayImage;

pub use cache::{CacheStats, MaskCache, MaskCacheConfig};
pub use generator::MaskGenerator;

/// Corner rounding as a fraction of the mask half-size, in `[0, 1]`.
///
/// Compared and hashed by bit pattern so it can be part of a cache key.
#[derive(Debug, Clone, Copy)]
pub struct CornerRatio(f32);

impl CornerRatio {
    pub const SHARP: CornerRatio = CornerRatio(0.0);

    /// Create a ratio, clamping to `[0, 1]`. NaN becomes 0.
    pub fn new(value: f32) -> Self {
        if value.is_nan() || value <= 0.0 {
            Self(0.0)
        } else {
            Self(value.min(1.0))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn is_rounded(self) -> bool {
        self.0 > 0.0
    }
}

impl PartialEq for CornerRatio {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for CornerRatio {}

impl Hash for CornerRatio {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Cache key: quantized mask size plus corner rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskKey {
    pub width: u32,
    pub height: u32,
    pub corner_ratio: CornerRatio,
}

/// A built mask and where to place it relative to a detection.
#[derive(Debug, Clone)]
pub struct MaskEntry {
    /// Pixels between the mask's left edge and the detection's left edge
    pub offset_x: i32,
    /// Pixels between the mask's top edge and the detection's top edge
    pub offset_y: i32,
    /// Single-channel blend weights; immutable once published
    pub mask: Arc<GrayImage>,
}
