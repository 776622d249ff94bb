//! Shared data models for detection-driven region blurring.
//!
//! This crate provides Serde-serializable types for:
//! - Detections as written to the side file by an external detector
//! - Detection kinds and their corner-rounding table
//! - Integer pixel geometry used when placing masks on a frame

pub mod detection;
pub mod rect;

pub use detection::{Detection, DetectionKind, FrameDetections};
pub use rect::{FrameSize, PixelRect};
