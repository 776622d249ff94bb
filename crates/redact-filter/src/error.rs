//! Error types for the filter surface.

use redact_media::MediaError;
use thiserror::Error;

pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Unknown parameter: {0}")]
    UnknownParam(String),

    #[error("Invalid value for parameter {name}: {message}")]
    InvalidParam { name: String, message: String },

    #[error("Frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl FilterError {
    pub fn invalid_param(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            message: message.into(),
        }
    }
}
