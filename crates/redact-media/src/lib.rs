#![deny(unreachable_patterns)]
//! Detection-driven region blurring.
//!
//! This crate provides:
//! - An incremental reader for (possibly still growing) gzip/zstd/plain JSON
//!   side files mapping frames to detections
//! - A process-wide, quantized LRU cache of feathered alpha masks with idle
//!   reclamation
//! - The per-detection geometry and compositing that blurs a region of an
//!   RGBA frame in place

pub mod compositor;
pub mod error;
pub mod mask;
pub mod metrics;
pub mod stream;

pub use compositor::{CompositorConfig, Placement, RegionCompositor};
pub use error::{MediaError, MediaResult};
pub use mask::{CacheStats, CornerRatio, MaskCache, MaskCacheConfig, MaskEntry, MaskGenerator, MaskKey};
pub use stream::{
    Backoff, Compression, DetectionStreamReader, FrameTable, ReaderConfig, SideFile, Sleeper,
    ThreadSleeper,
};
