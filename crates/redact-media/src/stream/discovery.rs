//! Locating the side file among its finished and in-progress names.
//!
//! The producer writes `<base>.json.gz_wip` (or a zstd/plain variant) and
//! renames it once done, so the reader probes the most complete form first.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Suffixes appended to the configured base path, most complete first.
/// The empty suffix probes the base path itself.
pub const SIDE_FILE_SUFFIXES: &[&str] = &[
    ".json.gz",
    ".json.zst",
    ".json.gz_wip",
    ".json.zst_wip",
    ".json_wip",
    "_wip",
    "",
];

/// In-progress marker appended by the producer.
const WIP_SUFFIX: &str = "_wip";

/// Compression of a side file, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compression {
    Gzip,
    Zstd,
    None,
}

impl Compression {
    /// Infer compression from a file name, ignoring an in-progress suffix.
    pub fn from_path(path: &Path) -> Self {
        let name = path.to_string_lossy();
        let name = name.strip_suffix(WIP_SUFFIX).unwrap_or(&*name);

        if name.ends_with(".gz") {
            Self::Gzip
        } else if name.ends_with(".zst") {
            Self::Zstd
        } else {
            Self::None
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::None => "none",
        })
    }
}

/// The side file that was selected, and how to decompress it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideFile {
    pub path: PathBuf,
    pub compression: Compression,
}

impl SideFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let compression = Compression::from_path(&path);
        Self { path, compression }
    }

    /// Whether the producer is still writing this file.
    pub fn is_in_progress(&self) -> bool {
        self.path.to_string_lossy().ends_with(WIP_SUFFIX)
    }
}

/// Candidate paths for `base`, in probing order.
pub fn candidates(base: &Path) -> Vec<PathBuf> {
    SIDE_FILE_SUFFIXES
        .iter()
        .map(|suffix| {
            let mut name = OsString::from(base.as_os_str());
            name.push(suffix);
            PathBuf::from(name)
        })
        .collect()
}

/// Find the first existing side file for `base`.
///
/// # Errors
///
/// Returns [`MediaError::SideFileNotFound`] if no candidate exists.
pub fn find_side_file(base: &Path) -> MediaResult<SideFile> {
    if base.as_os_str().is_empty() {
        return Err(MediaError::SideFileNotFound(base.to_path_buf()));
    }

    candidates(base)
        .into_iter()
        .find(|path| path.is_file())
        .map(SideFile::new)
        .ok_or_else(|| MediaError::SideFileNotFound(base.to_path_buf()))
}
