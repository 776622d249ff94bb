//! The per-stream filter instance driven by the host.

use std::sync::Arc;

use redact_media::{Backoff, DetectionStreamReader, MaskCache, RegionCompositor};
use redact_models::FrameSize;
use tracing::{debug, error, info, warn};

use crate::config::{FilterConfig, ParamValue};
use crate::error::{FilterError, FilterResult};
use crate::overlay::{DebugOverlay, FrameView, OutlineOverlay};
use crate::telemetry;

/// Blurs detected regions of one video stream, frame by frame.
///
/// Frames must be fed in stream order: each call to [`update`](Self::update)
/// consumes the next frame of the side file.
pub struct RedactFilter {
    size: FrameSize,
    config: FilterConfig,
    compositor: RegionCompositor,
    /// Built on the first frame so parameters can be set after construction
    reader: Option<DetectionStreamReader>,
    backoff: Backoff,
    overlay: Box<dyn DebugOverlay>,
    frames_processed: u64,
}

impl RedactFilter {
    /// Create a filter for frames of `width` x `height` RGBA8 pixels.
    pub fn new(width: u32, height: u32, config: FilterConfig, cache: Arc<MaskCache>) -> Self {
        telemetry::init_tracing();

        let size = FrameSize::new(width, height);
        info!(
            width,
            height,
            json_path = %config.json_path.display(),
            "Creating redact filter"
        );

        Self {
            size,
            compositor: RegionCompositor::new(config.compositor_config(), cache),
            config,
            reader: None,
            backoff: Backoff::default(),
            overlay: Box::new(OutlineOverlay::default()),
            frames_processed: 0,
        }
    }

    /// Create a filter using the process-wide mask cache.
    pub fn with_shared_cache(width: u32, height: u32, config: FilterConfig) -> Self {
        Self::new(width, height, config, MaskCache::shared())
    }

    /// Replace the wait schedule used while the side file catches up.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_overlay(mut self, overlay: impl DebugOverlay + 'static) -> Self {
        self.overlay = Box::new(overlay);
        self
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<MaskCache> {
        self.compositor.cache()
    }

    /// Frames processed so far.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Side-file index of the next frame to be read.
    pub fn frame_index(&self) -> usize {
        self.reader
            .as_ref()
            .map(DetectionStreamReader::frame_index)
            .unwrap_or(self.config.skip_frames_start)
    }

    /// Set a host parameter.
    ///
    /// Changing a stream parameter after frames have been processed restarts
    /// reading from the configured start.
    pub fn set_param(&mut self, name: &str, value: ParamValue) -> FilterResult<()> {
        self.config.set_param(name, value)?;
        self.compositor = RegionCompositor::new(
            self.config.compositor_config(),
            Arc::clone(self.compositor.cache()),
        );

        if let Some(reader) = &self.reader {
            if *reader.config() != self.config.reader_config().with_backoff(self.backoff) {
                warn!(param = name, "Stream parameter changed mid-stream, restarting side file");
                self.reader = None;
            }
        }
        Ok(())
    }

    pub fn get_param(&self, name: &str) -> FilterResult<ParamValue> {
        self.config.get_param(name)
    }

    /// Process one frame: copy `input` to `out` and blur every detection of
    /// the next side-file frame into `out`.
    ///
    /// Blocks while the side file has no data for this frame yet. Buffers of
    /// the wrong size are reported and the frame is passed through.
    pub fn update(&mut self, time: f64, out: &mut [u8], input: &[u8]) {
        if let Err(e) = self.process_frame(time, out, input) {
            error!(time, error = %e, "Frame not processed, passing it through");
            if out.len() == input.len() {
                out.copy_from_slice(input);
            }
        }
    }

    /// Like [`update`](Self::update), but reports errors instead of passing
    /// the frame through. Returns the number of blurred regions.
    ///
    /// # Errors
    ///
    /// [`FilterError::BufferSize`] if either buffer is not
    /// `width * height * 4` bytes. `out` is left untouched in that case.
    pub fn process_frame(&mut self, time: f64, out: &mut [u8], input: &[u8]) -> FilterResult<usize> {
        let expected = self.size.rgba_len();
        for actual in [input.len(), out.len()] {
            if actual != expected {
                return Err(FilterError::BufferSize { expected, actual });
            }
        }

        out.copy_from_slice(input);
        self.compositor.cache().touch();

        let backoff = self.backoff;
        let config = &self.config;
        let reader = self.reader.get_or_insert_with(|| {
            DetectionStreamReader::new(config.reader_config().with_backoff(backoff))
        });
        let frame_index = reader.frame_index();
        let detections = reader.next_frame_detections();

        let expected = self.size.rgba_len();
        let mut frame = FrameView::from_raw(self.size.width, self.size.height, out).ok_or(
            FilterError::BufferSize {
                expected,
                actual: expected,
            },
        )?;

        if self.config.debug {
            self.overlay.frame_label(&mut frame, frame_index);
        }

        let mut blurred = 0;
        for (index, detection) in detections.iter().enumerate() {
            if let Some(region) = self.compositor.apply(&mut frame, detection) {
                blurred += 1;
                if self.config.debug {
                    self.overlay.detection_label(&mut frame, index, region);
                }
            }
        }

        self.frames_processed += 1;
        redact_media::metrics::record_frame(blurred);
        debug!(
            time,
            frame = frame_index,
            detections = detections.len(),
            blurred,
            "Processed frame"
        );

        Ok(blurred)
    }
}

impl std::fmt::Debug for RedactFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedactFilter")
            .field("size", &self.size)
            .field("config", &self.config)
            .field("reader", &self.reader)
            .field("frames_processed", &self.frames_processed)
            .finish_non_exhaustive()
    }
}
