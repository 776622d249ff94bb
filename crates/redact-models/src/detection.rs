//! Detections read from the side file.

use serde::{Deserialize, Serialize};

use crate::rect::PixelRect;

/// What kind of object a detection covers.
///
/// Unknown kind strings in the side file deserialize to [`DetectionKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    Face,
    Person,
    #[default]
    #[serde(other)]
    Other,
}

impl DetectionKind {
    /// Fraction of the mask half-size used as corner radius.
    ///
    /// Faces get a fully rounded (elliptical) mask, people a mostly rounded
    /// one, and everything else a sharp rectangle.
    pub fn corner_ratio(self) -> f32 {
        match self {
            Self::Face => 1.0,
            Self::Person => 0.8,
            Self::Other => 0.0,
        }
    }

    /// Whether masks for this kind have rounded corners.
    pub fn is_rounded(self) -> bool {
        self.corner_ratio() > 0.0
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Person => "person",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single region to blur, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detector confidence. Not bounded to 0..1.
    pub score: f64,
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    #[serde(default)]
    pub kind: DetectionKind,
}

/// All detections of one logical frame.
pub type FrameDetections = Vec<Detection>;

impl Detection {
    /// Create a new detection.
    pub fn new(score: f64, x_min: f64, y_min: f64, x_max: f64, y_max: f64, kind: DetectionKind) -> Self {
        Self {
            score,
            x_min,
            y_min,
            x_max,
            y_max,
            kind,
        }
    }

    /// Box width. May be zero or negative for malformed input.
    #[inline]
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Box height. May be zero or negative for malformed input.
    #[inline]
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Integer bounding box from rounded corner coordinates.
    ///
    /// Width and height are derived from the rounded max coordinates so that
    /// adjacent boxes tile without gaps. Coordinates outside the `i32` range
    /// saturate, as does the resulting size.
    pub fn pixel_box(&self) -> PixelRect {
        let x = self.x_min.round() as i32;
        let y = self.y_min.round() as i32;
        PixelRect::new(
            x,
            y,
            (self.x_max.round() as i32).saturating_sub(x),
            (self.y_max.round() as i32).saturating_sub(y),
        )
    }

    /// Integer bounding box with every coordinate clamped into `bounds`
    /// before rounding.
    ///
    /// Unlike clipping [`pixel_box`](Self::pixel_box) afterwards, a box with
    /// coordinates far outside the `i32` range still covers all of `bounds`.
    /// NaN coordinates are treated as the lower bound.
    pub fn pixel_box_within(&self, bounds: PixelRect) -> PixelRect {
        let clamp = |v: f64, lo: i32, hi: i32| v.round().max(lo as f64).min(hi as f64) as i32;

        let x = clamp(self.x_min, bounds.x, bounds.right());
        let y = clamp(self.y_min, bounds.y, bounds.bottom());
        let right = clamp(self.x_max, bounds.x, bounds.right());
        let bottom = clamp(self.y_max, bounds.y, bounds.bottom());
        PixelRect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }
}
