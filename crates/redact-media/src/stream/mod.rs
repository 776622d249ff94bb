//! Incremental reading of the detection side file.
//!
//! The side file is produced by an external detector that may still be
//! writing it. The reader maps "next frame" to that frame's detections,
//! reloading the file and backing off whenever the producer has not caught
//! up yet.

pub mod backoff;
pub mod discovery;
pub mod parse;
pub mod reader;

pub use backoff::{Backoff, Sleeper, ThreadSleeper};
pub use discovery::{find_side_file, Compression, SideFile, SIDE_FILE_SUFFIXES};
pub use parse::{load_frame_table, FrameTable};
pub use reader::{DetectionStreamReader, ReaderConfig};
