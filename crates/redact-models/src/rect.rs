//! Integer pixel geometry.

use serde::{Deserialize, Serialize};

/// Dimensions of a video frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of bytes in an RGBA8 buffer of this size.
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// The whole frame as a rectangle.
    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width as i32, self.height as i32)
    }
}

/// A rectangle in frame pixel coordinates.
///
/// Signed so that boxes partially (or fully) outside the frame can be
/// represented before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Right edge (exclusive).
    #[inline]
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge (exclusive).
    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// True when the rectangle covers no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// True when the rectangle lies entirely inside `frame`.
    pub fn is_within(&self, frame: FrameSize) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.right() <= frame.width as i32
            && self.bottom() <= frame.height as i32
    }

    /// Center point, rounded toward the top-left.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_and_center() {
        let rect = PixelRect::new(10, 20, 30, 40);
        assert_eq!(rect.right(), 40);
        assert_eq!(rect.bottom(), 60);
        assert_eq!(rect.center(), (25, 40));
    }

    #[test]
    fn test_is_within() {
        let frame = FrameSize::new(100, 50);
        assert!(PixelRect::new(0, 0, 100, 50).is_within(frame));
        assert!(!PixelRect::new(-1, 0, 10, 10).is_within(frame));
        assert!(!PixelRect::new(95, 0, 10, 10).is_within(frame));
        assert_eq!(frame.bounds(), PixelRect::new(0, 0, 100, 50));
        assert_eq!(frame.rgba_len(), 20_000);
    }

    #[test]
    fn test_edges_saturate() {
        let rect = PixelRect::new(i32::MAX - 5, 0, 100, i32::MAX);
        assert_eq!(rect.right(), i32::MAX);
        assert_eq!(rect.bottom(), i32::MAX);
    }
}
