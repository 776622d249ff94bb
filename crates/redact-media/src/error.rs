//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while reading detections or building masks.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("No side file found for base path: {0}")]
    SideFileNotFound(PathBuf),

    #[error("Side file has unexpected format, should have a map at top level: {0}")]
    UnexpectedFormat(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No detections available for frame {frame} (loaded {available} frames)")]
    StreamExhausted { frame: usize, available: usize },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an invalid geometry error.
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry(message.into())
    }

    /// Create an unexpected format error.
    pub fn unexpected_format(message: impl Into<String>) -> Self {
        Self::UnexpectedFormat(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the producer may still fix this by writing more data.
    ///
    /// Malformed files are retried as well, but this lets callers log them
    /// differently from plain "not there yet".
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SideFileNotFound(_) | Self::StreamExhausted { .. } | Self::Io(_)
        ) || matches!(self, Self::JsonParse(e) if e.is_eof())
    }
}
