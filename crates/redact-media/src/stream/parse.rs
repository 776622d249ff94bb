//! Decompressing and parsing the side file.
//!
//! The file is one JSON object whose members are frames in temporal order.
//! Member order is significant and member names are not, so the object is
//! parsed into an ordered list instead of a map.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};

use flate2::read::MultiGzDecoder;
use redact_models::FrameDetections;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::error::Category;

use super::discovery::{Compression, SideFile};
use crate::error::{MediaError, MediaResult};

/// Frames of a side file, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTable {
    frames: Vec<(String, FrameDetections)>,
}

impl FrameTable {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Detections of the frame at `index`.
    pub fn get(&self, index: usize) -> Option<&FrameDetections> {
        self.frames.get(index).map(|(_, detections)| detections)
    }

    /// The member name of the frame at `index`.
    pub fn key(&self, index: usize) -> Option<&str> {
        self.frames.get(index).map(|(key, _)| key.as_str())
    }

    /// Move the detections at `index` out, leaving an empty list behind.
    pub fn take(&mut self, index: usize) -> Option<FrameDetections> {
        self.frames
            .get_mut(index)
            .map(|(_, detections)| std::mem::take(detections))
    }
}

impl<'de> Deserialize<'de> for FrameTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FrameTableVisitor;

        impl<'de> Visitor<'de> for FrameTableVisitor {
            type Value = FrameTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from frame keys to arrays of detections")
            }

            fn visit_map<A>(self, mut map: A) -> Result<FrameTable, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut frames = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, detections)) = map.next_entry::<String, FrameDetections>()? {
                    frames.push((key, detections));
                }
                Ok(FrameTable { frames })
            }
        }

        deserializer.deserialize_map(FrameTableVisitor)
    }
}

/// Parse a frame table from an already decompressed stream.
pub fn parse_frame_table<R: Read>(reader: R) -> MediaResult<FrameTable> {
    serde_json::from_reader(reader).map_err(|e| match e.classify() {
        Category::Io => MediaError::Io(e.into()),
        Category::Data => MediaError::unexpected_format(e.to_string()),
        Category::Syntax | Category::Eof => MediaError::JsonParse(e),
    })
}

/// Open, decompress and parse a side file.
///
/// # Errors
///
/// - [`MediaError::Io`] if the file cannot be opened or fails to decompress
/// - [`MediaError::JsonParse`] for invalid or truncated JSON
/// - [`MediaError::UnexpectedFormat`] if the top level is not an object or a
///   frame entry is not an array of detections
pub fn load_frame_table(side_file: &SideFile) -> MediaResult<FrameTable> {
    let file = File::open(&side_file.path)?;

    match side_file.compression {
        Compression::Gzip => parse_frame_table(BufReader::new(MultiGzDecoder::new(
            BufReader::new(file),
        ))),
        Compression::Zstd => parse_frame_table(BufReader::new(zstd::stream::read::Decoder::new(
            file,
        )?)),
        Compression::None => parse_frame_table(BufReader::new(file)),
    }
}
