//! Blurring detected regions into a frame.
//!
//! For every detection the compositor works out where its feathered mask
//! lands on the frame, blurs that patch, and blends it back using the mask as
//! the per-pixel weight. Geometry is resolved by [`RegionCompositor::plan`]
//! without touching pixels, so placement can be inspected on its own.
//!
//! Rounded masks leave their corners unblurred. When a detection touches the
//! frame border that would show up as a sliver of sharp pixels along the
//! edge, so the mask is doubled along that axis and shifted back to stay
//! centered on the detection's edge.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use image::{imageops, ImageBuffer, Rgba, RgbaImage};
use redact_models::{Detection, FrameSize, PixelRect};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::mask::{CornerRatio, MaskCache, MaskEntry};

/// Configuration for the region compositor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// Detections scoring below this are left alone (default: 0.2)
    pub min_score: f64,
    /// Rounded masks ending closer than this to a border are enlarged
    /// (default: 10px)
    pub min_mask_gap: i32,
    /// Lower bound for the blur sigma (default: 4.0)
    pub min_blur: f64,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            min_score: 0.2,
            min_mask_gap: 10,
            min_blur: 4.0,
        }
    }
}

impl CompositorConfig {
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_min_mask_gap(mut self, gap: i32) -> Self {
        self.min_mask_gap = gap;
        self
    }
}

/// Resolved placement of one detection's blur on a frame.
#[derive(Debug, Clone)]
pub struct Placement {
    /// Rounded detection box, clipped to the frame grown by the mask gap
    pub detection_box: PixelRect,
    /// Mask size requested from the cache, after border enlargement
    pub enlarged_width: i32,
    pub enlarged_height: i32,
    /// Frame area that gets blurred, always inside the frame
    pub region: PixelRect,
    /// Part of the mask that covers `region`
    pub mask_crop: PixelRect,
    /// Gaussian sigma for the region blur
    pub blur_sigma: f32,
    pub mask: MaskEntry,
}

impl Placement {
    /// Whether the mask was enlarged because the box is near a border.
    pub fn is_enlarged(&self) -> bool {
        self.enlarged_width != self.detection_box.width
            || self.enlarged_height != self.detection_box.height
    }
}

/// Applies detections to frames using masks from a shared cache.
#[derive(Debug, Clone)]
pub struct RegionCompositor {
    config: CompositorConfig,
    cache: Arc<MaskCache>,
}

impl RegionCompositor {
    pub fn new(config: CompositorConfig, cache: Arc<MaskCache>) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<MaskCache> {
        &self.cache
    }

    /// Resolve where (and whether) a detection is blurred on a frame.
    ///
    /// Returns `None` for detections below the score threshold, with an
    /// empty box, or whose mask falls entirely outside the frame. Boxes
    /// reaching further than the mask gap past a border are clipped first.
    pub fn plan(&self, detection: &Detection, frame: FrameSize) -> Option<Placement> {
        if detection.score < self.config.min_score {
            return None;
        }

        let frame_width = frame.width as i32;
        let frame_height = frame.height as i32;
        let gap = self.config.min_mask_gap;

        // Boxes never extend more than the gap past the frame, which bounds
        // the mask size no matter what coordinates the detector wrote
        let margin = gap.max(0);
        let reach = PixelRect::new(
            -margin,
            -margin,
            frame_width.saturating_add(margin.saturating_mul(2)),
            frame_height.saturating_add(margin.saturating_mul(2)),
        );
        let detection_box = detection.pixel_box_within(reach);
        if detection_box.is_empty() {
            trace!(
                x_min = detection.x_min,
                y_min = detection.y_min,
                x_max = detection.x_max,
                y_max = detection.y_max,
                "Skipping degenerate or off-frame detection"
            );
            return None;
        }

        let corner_ratio = CornerRatio::new(detection.kind.corner_ratio());
        let rounded = corner_ratio.is_rounded();

        let PixelRect { x, y, .. } = detection_box;
        let near_left = rounded && x < gap;
        let near_top = rounded && y < gap;
        let near_right = rounded && detection_box.right() > frame_width - gap;
        let near_bottom = rounded && detection_box.bottom() > frame_height - gap;

        let mut width = detection_box.width;
        let mut height = detection_box.height;
        if near_left || near_right {
            width *= 2;
        }
        if near_top || near_bottom {
            height *= 2;
        }

        let mask = match self.cache.get_or_create(width, height, corner_ratio) {
            Ok(mask) => mask,
            Err(e) => {
                trace!(error = %e, "Skipping detection without mask");
                return None;
            }
        };

        // Keep the enlarged mask centered on the edge the box touches
        let mut offset_x = mask.offset_x;
        let mut offset_y = mask.offset_y;
        if near_left {
            offset_x += width / 2;
        }
        if near_top {
            offset_y += height / 2;
        }

        let origin_x = x - offset_x;
        let origin_y = y - offset_y;
        let left = origin_x.max(0);
        let top = origin_y.max(0);

        // Mask pixels that would land left of / above the frame
        let mask_left = -origin_x.min(0);
        let mask_top = -origin_y.min(0);
        let mask_width = mask.mask.width() as i32;
        let mask_height = mask.mask.height() as i32;

        let crop_width = (mask_width - mask_left).min(frame_width - left);
        let crop_height = (mask_height - mask_top).min(frame_height - top);
        if crop_width <= 0 || crop_height <= 0 {
            trace!(?detection_box, "Skipping detection outside the frame");
            return None;
        }

        let blur_sigma = self
            .config
            .min_blur
            .max(width.max(height) as f64 / 10.0)
            .round() as f32;

        Some(Placement {
            detection_box,
            enlarged_width: width,
            enlarged_height: height,
            region: PixelRect::new(left, top, crop_width, crop_height),
            mask_crop: PixelRect::new(mask_left, mask_top, crop_width, crop_height),
            blur_sigma,
            mask,
        })
    }

    /// Blur one detection into `frame` in place.
    ///
    /// Returns the blurred region, or `None` if the detection was skipped.
    pub fn apply<C>(
        &self,
        frame: &mut ImageBuffer<Rgba<u8>, C>,
        detection: &Detection,
    ) -> Option<PixelRect>
    where
        C: Deref<Target = [u8]> + DerefMut,
    {
        let size = FrameSize::new(frame.width(), frame.height());
        let placement = self.plan(detection, size)?;
        composite(frame, &placement);
        Some(placement.region)
    }
}

/// Blur the placement's region and blend it back with the mask as weight.
fn composite<C>(frame: &mut ImageBuffer<Rgba<u8>, C>, placement: &Placement)
where
    C: Deref<Target = [u8]> + DerefMut,
{
    let region = placement.region;
    let (x, y) = (region.x as u32, region.y as u32);
    let (width, height) = (region.width as u32, region.height as u32);

    let mut patch = RgbaImage::from_fn(width, height, |px, py| *frame.get_pixel(x + px, y + py));
    let blurred = imageops::blur(&patch, placement.blur_sigma);
    let mask = placement.mask.mask.as_ref();
    let (mask_x, mask_y) = (placement.mask_crop.x as u32, placement.mask_crop.y as u32);

    for (px, py, pixel) in patch.enumerate_pixels_mut() {
        let weight = mask.get_pixel(mask_x + px, mask_y + py)[0] as u32;
        if weight == 0 {
            continue;
        }
        let blur = blurred.get_pixel(px, py);
        for (out, b) in pixel.0.iter_mut().zip(blur.0) {
            *out = ((b as u32 * weight + *out as u32 * (255 - weight) + 127) / 255) as u8;
        }
    }

    imageops::replace(frame, &patch, x as i64, y as i64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::MaskCacheConfig;
    use redact_models::DetectionKind;

    const W: u32 = 160;
    const H: u32 = 120;

    fn compositor(min_score: f64) -> RegionCompositor {
        let cache = MaskCache::new(MaskCacheConfig::default().with_idle_timeout(None));
        RegionCompositor::new(CompositorConfig::default().with_min_score(min_score), cache)
    }

    fn checkerboard(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    fn face(x: f64, y: f64, w: f64, h: f64) -> Detection {
        Detection::new(0.9, x, y, x + w, y + h, DetectionKind::Face)
    }

    #[test]
    fn test_low_score_is_ignored() {
        let compositor = compositor(0.5);
        let mut frame = checkerboard(W, H);
        let original = frame.clone();

        let det = Detection::new(0.49, 40.0, 40.0, 80.0, 80.0, DetectionKind::Face);
        assert!(compositor.apply(&mut frame, &det).is_none());
        assert_eq!(frame, original);
    }

    #[test]
    fn test_interior_box_is_not_enlarged() {
        let compositor = compositor(0.0);
        let placement = compositor
            .plan(&face(40.0, 30.0, 50.0, 40.0), FrameSize::new(W, H))
            .unwrap();

        assert!(!placement.is_enlarged());
        assert_eq!((placement.enlarged_width, placement.enlarged_height), (50, 40));
        assert!(placement.region.is_within(FrameSize::new(W, H)));
    }

    #[test]
    fn test_face_at_left_edge_is_enlarged_without_gap() {
        let compositor = compositor(0.0);
        let placement = compositor
            .plan(&face(0.0, 40.0, 30.0, 30.0), FrameSize::new(W, H))
            .unwrap();

        assert_eq!(placement.enlarged_width, 60);
        assert_eq!(placement.enlarged_height, 30);
        assert_eq!(placement.region.x, 0);
        // The mask is shifted so its middle sits on the frame edge
        assert_eq!(placement.mask_crop.x, placement.mask.offset_x + 30);
    }

    #[test]
    fn test_face_near_bottom_right_is_enlarged_and_clamped() {
        let compositor = compositor(0.0);
        let frame = FrameSize::new(W, H);
        let placement = compositor.plan(&face(130.0, 95.0, 25.0, 20.0), frame).unwrap();

        assert_eq!((placement.enlarged_width, placement.enlarged_height), (50, 40));
        assert!(placement.region.is_within(frame));
        assert_eq!(placement.region.right(), W as i32);
        assert_eq!(placement.region.bottom(), H as i32);
    }

    #[test]
    fn test_sharp_kinds_are_never_enlarged() {
        let compositor = compositor(0.0);
        let det = Detection::new(0.9, 0.0, 0.0, 30.0, 30.0, DetectionKind::Other);
        let placement = compositor.plan(&det, FrameSize::new(W, H)).unwrap();

        assert!(!placement.is_enlarged());
        assert_eq!(placement.region.x, 0);
        assert!(placement.mask_crop.x > 0);
    }

    #[test]
    fn test_off_frame_and_degenerate_are_skipped() {
        let compositor = compositor(0.0);
        let frame = FrameSize::new(W, H);

        assert!(compositor.plan(&face(500.0, 10.0, 30.0, 30.0), frame).is_none());
        assert!(compositor.plan(&face(-400.0, 40.0, 30.0, 30.0), frame).is_none());
        assert!(compositor.plan(&face(40.0, 40.0, 0.0, 30.0), frame).is_none());
        assert!(compositor
            .plan(&Detection::new(1.0, 50.0, 50.0, 40.0, 60.0, DetectionKind::Face), frame)
            .is_none());
    }

    #[test]
    fn test_oversized_box_is_clipped_to_frame() {
        let compositor = compositor(0.0);
        let frame = FrameSize::new(64, 48);

        let wide = face(0.0, 0.0, 60_000.0, 48.0);
        let placement = compositor.plan(&wide, frame).unwrap();
        assert_eq!(placement.detection_box, PixelRect::new(0, 0, 74, 48));
        assert_eq!((placement.enlarged_width, placement.enlarged_height), (148, 96));
        assert!(placement.region.is_within(frame));
        assert!(placement.mask.mask.width() < 4 * 64);
    }

    #[test]
    fn test_out_of_range_coordinates_do_not_overflow() {
        let compositor = compositor(0.0);
        let mut frame = checkerboard(W, H);

        for det in [
            face(0.0, 0.0, 1.2e9, 40.0),
            Detection::new(0.9, -2e9, -2e9, 2e9, 2e9, DetectionKind::Face),
            Detection::new(0.9, f64::NEG_INFINITY, 0.0, f64::INFINITY, 40.0, DetectionKind::Person),
        ] {
            let region = compositor.apply(&mut frame, &det).unwrap();
            assert!(region.is_within(FrameSize::new(W, H)));
        }

        let far = Detection::new(0.9, 3e9, 3e9, 4e9, 4e9, DetectionKind::Face);
        assert!(compositor.plan(&far, FrameSize::new(W, H)).is_none());
    }

    #[test]
    fn test_blur_strength_scales_with_size() {
        let compositor = compositor(0.0);
        let frame = FrameSize::new(W, H);

        let small = compositor.plan(&face(40.0, 40.0, 20.0, 20.0), frame).unwrap();
        assert_eq!(small.blur_sigma, 4.0);

        let large = compositor.plan(&face(20.0, 20.0, 100.0, 80.0), frame).unwrap();
        assert_eq!(large.blur_sigma, 10.0);
    }

    #[test]
    fn test_apply_blurs_inside_and_keeps_outside() {
        let compositor = compositor(0.0);
        let mut frame = checkerboard(W, H);
        let original = frame.clone();

        let region = compositor
            .apply(&mut frame, &face(60.0, 40.0, 40.0, 40.0))
            .unwrap();

        // Center of the detection is fully blurred toward mid gray
        let center = frame.get_pixel(80, 60);
        assert!((100..=155).contains(&center[0]), "center = {:?}", center);
        assert_eq!(center[3], 255);

        // Pixels outside the placed region are untouched
        for (x, y, pixel) in frame.enumerate_pixels() {
            let inside = (x as i32) >= region.x
                && (x as i32) < region.right()
                && (y as i32) >= region.y
                && (y as i32) < region.bottom();
            if !inside {
                assert_eq!(pixel, original.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn test_apply_on_borrowed_buffer() {
        let compositor = compositor(0.0);
        let mut raw = checkerboard(W, H).into_raw();
        let before = raw.clone();

        {
            let mut view = ImageBuffer::<Rgba<u8>, &mut [u8]>::from_raw(W, H, raw.as_mut_slice()).unwrap();
            compositor.apply(&mut view, &face(0.0, 0.0, 40.0, 40.0)).unwrap();
        }

        assert_ne!(raw, before);
    }
}
