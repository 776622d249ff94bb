//! Frame-update entry point for detection-driven blurring.
//!
//! A video host creates one [`RedactFilter`] per stream, sets its parameters
//! and then calls [`RedactFilter::update`] once per frame. Detections are read
//! from a side file that may still be growing while frames are processed.

pub mod config;
pub mod error;
pub mod filter;
pub mod overlay;
pub mod telemetry;

pub use config::{FilterConfig, ParamInfo, ParamKind, ParamValue};
pub use error::{FilterError, FilterResult};
pub use filter::RedactFilter;
pub use overlay::{DebugOverlay, OutlineOverlay};
pub use telemetry::init_tracing;
