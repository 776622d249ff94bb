//! Debug markers drawn onto processed frames.
//!
//! The filter does not render text. Hosts that want readable labels plug in
//! their own [`DebugOverlay`]; [`OutlineOverlay`] marks regions and frame
//! numbers with plain pixels.

use image::{ImageBuffer, Rgba};
use redact_models::PixelRect;
use tracing::debug;

/// An RGBA frame borrowed from the host's output buffer.
pub type FrameView<'a> = ImageBuffer<Rgba<u8>, &'a mut [u8]>;

/// Draws debug information onto a processed frame.
pub trait DebugOverlay: Send {
    /// Mark the frame with its index in the side file.
    fn frame_label(&self, frame: &mut FrameView<'_>, frame_index: usize);

    /// Mark a blurred region with the index of its detection.
    fn detection_label(&self, frame: &mut FrameView<'_>, index: usize, region: PixelRect);
}

/// Outlines blurred regions and encodes the frame index as a bar of cells.
///
/// The bar sits in the top-left corner and holds the index in binary, most
/// significant bit first: lit cells are 1, dark cells are 0.
#[derive(Debug, Clone)]
pub struct OutlineOverlay {
    pub color: Rgba<u8>,
    /// Outline thickness in pixels (default: 2)
    pub thickness: i32,
    /// Edge length of one bar cell in pixels (default: 4)
    pub cell_size: i32,
    /// Number of bits shown in the bar (default: 16)
    pub bits: u32,
}

impl Default for OutlineOverlay {
    fn default() -> Self {
        Self {
            color: Rgba([0, 255, 0, 255]),
            thickness: 2,
            cell_size: 4,
            bits: 16,
        }
    }
}

const DARK: Rgba<u8> = Rgba([0, 0, 0, 255]);

impl OutlineOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(mut self, color: Rgba<u8>) -> Self {
        self.color = color;
        self
    }
}

impl DebugOverlay for OutlineOverlay {
    fn frame_label(&self, frame: &mut FrameView<'_>, frame_index: usize) {
        debug!(frame = frame_index, "Debug frame label");

        for bit in 0..self.bits {
            let shift = self.bits - 1 - bit;
            let lit = (frame_index as u64 >> shift) & 1 == 1;
            let cell = PixelRect::new(
                bit as i32 * self.cell_size,
                0,
                self.cell_size,
                self.cell_size,
            );
            fill_rect(frame, cell, if lit { self.color } else { DARK });
        }
    }

    fn detection_label(&self, frame: &mut FrameView<'_>, index: usize, region: PixelRect) {
        debug!(
            detection = index,
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "Debug detection label"
        );

        let t = self.thickness.min(region.width).min(region.height);
        if t <= 0 {
            return;
        }
        let (x, y, w, h) = (region.x, region.y, region.width, region.height);
        fill_rect(frame, PixelRect::new(x, y, w, t), self.color);
        fill_rect(frame, PixelRect::new(x, y + h - t, w, t), self.color);
        fill_rect(frame, PixelRect::new(x, y, t, h), self.color);
        fill_rect(frame, PixelRect::new(x + w - t, y, t, h), self.color);
    }
}

/// Fill `rect`, clipped to the frame.
fn fill_rect(frame: &mut FrameView<'_>, rect: PixelRect, color: Rgba<u8>) {
    let left = rect.x.max(0);
    let top = rect.y.max(0);
    let right = rect.right().min(frame.width() as i32);
    let bottom = rect.bottom().min(frame.height() as i32);

    for y in top..bottom {
        for x in left..right {
            frame.put_pixel(x as u32, y as u32, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> Vec<u8> {
        vec![128; (width * height * 4) as usize]
    }

    #[test]
    fn test_frame_label_encodes_index() {
        let mut buf = blank(80, 10);
        let mut frame = FrameView::from_raw(80, 10, buf.as_mut_slice()).unwrap();
        let overlay = OutlineOverlay::default();

        // 5 = ...0101, the last four of sixteen cells
        overlay.frame_label(&mut frame, 5);

        let cell = |i: u32| *frame.get_pixel(i * 4 + 1, 1);
        assert_eq!(cell(12), DARK);
        assert_eq!(cell(13), overlay.color);
        assert_eq!(cell(14), DARK);
        assert_eq!(cell(15), overlay.color);
        assert_eq!(*frame.get_pixel(70, 1), Rgba([128, 128, 128, 128]));
        assert_eq!(*frame.get_pixel(1, 5), Rgba([128, 128, 128, 128]));
    }

    #[test]
    fn test_detection_label_outlines_region() {
        let mut buf = blank(40, 40);
        let mut frame = FrameView::from_raw(40, 40, buf.as_mut_slice()).unwrap();
        let overlay = OutlineOverlay::default();

        overlay.detection_label(&mut frame, 0, PixelRect::new(10, 10, 20, 20));

        assert_eq!(*frame.get_pixel(10, 10), overlay.color);
        assert_eq!(*frame.get_pixel(11, 20), overlay.color);
        assert_eq!(*frame.get_pixel(29, 29), overlay.color);
        assert_eq!(*frame.get_pixel(20, 20), Rgba([128, 128, 128, 128]));
        assert_eq!(*frame.get_pixel(9, 9), Rgba([128, 128, 128, 128]));
    }

    #[test]
    fn test_drawing_is_clipped_to_frame() {
        let mut buf = blank(8, 8);
        let mut frame = FrameView::from_raw(8, 8, buf.as_mut_slice()).unwrap();
        let overlay = OutlineOverlay::default();

        overlay.frame_label(&mut frame, usize::MAX);
        overlay.detection_label(&mut frame, 1, PixelRect::new(-5, 4, 20, 20));

        assert_eq!(*frame.get_pixel(0, 0), overlay.color);
        assert_eq!(*frame.get_pixel(7, 4), overlay.color);
    }
}
