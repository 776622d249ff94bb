//! Filter parameters as exposed to the video host.
//!
//! Hosts address parameters by name and pass numbers as doubles, so frame
//! counts arrive as `f64` and are rounded here.

use std::path::PathBuf;

use redact_media::{CompositorConfig, ReaderConfig};
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, FilterResult};

/// Type of a host parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Double,
    Bool,
    String,
}

/// Name, type and help text of one host parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
}

/// A parameter value as passed across the host boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Double(f64),
    Bool(bool),
    String(String),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Double(_) => ParamKind::Double,
            Self::Bool(_) => ParamKind::Bool,
            Self::String(_) => ParamKind::String,
        }
    }
}

/// Filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Base path of the detection side file
    pub json_path: PathBuf,
    /// Frames to ignore from the beginning of the side file
    pub skip_frames_start: usize,
    /// Minimum detection score to blur (default: 0.2)
    pub min_score: f64,
    /// Stride through the side file: every processed frame advances it by
    /// this many frames. 0 and 1 both read every frame.
    pub skip_frames_every: usize,
    /// Draw frame and detection markers onto the output
    pub debug: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            json_path: PathBuf::new(),
            skip_frames_start: 0,
            min_score: 0.2,
            skip_frames_every: 0,
            debug: false,
        }
    }
}

impl FilterConfig {
    pub const JSON_PATH: &'static str = "jsonPath";
    pub const SKIP_FRAMES_START: &'static str = "skipFramesStart";
    pub const MIN_SCORE: &'static str = "minScore";
    pub const SKIP_FRAMES_EVERY: &'static str = "skipFramesEvery";
    pub const DEBUG: &'static str = "debug";

    /// Parameters in host registration order.
    pub const PARAMS: &'static [ParamInfo] = &[
        ParamInfo {
            name: Self::JSON_PATH,
            kind: ParamKind::String,
            description: "Path to the .json.gz from which to read the detections",
        },
        ParamInfo {
            name: Self::SKIP_FRAMES_START,
            kind: ParamKind::Double,
            description: "How many frames to ignore from the beginning of the .json.gz",
        },
        ParamInfo {
            name: Self::MIN_SCORE,
            kind: ParamKind::Double,
            description: "Float from 0.0 to 1.0. The larger, the higher the confidence the \
                          detection is correct. By default objects with a score of at least \
                          0.2 are blurred.",
        },
        ParamInfo {
            name: Self::SKIP_FRAMES_EVERY,
            kind: ParamKind::Double,
            description: "Process every Nth frame of the .json.gz (0 or 1 processes all of \
                          them). Use together with frame-rate reduction on the host, e.g. \
                          selecting every 15th frame with skipFramesEvery=15.",
        },
        ParamInfo {
            name: Self::DEBUG,
            kind: ParamKind::Bool,
            description: "Render frame and detection markers onto the image",
        },
    ];

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            json_path: std::env::var("REDACT_JSON_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.json_path),
            skip_frames_start: std::env::var("REDACT_SKIP_FRAMES_START")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.skip_frames_start),
            min_score: std::env::var("REDACT_MIN_SCORE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_score),
            skip_frames_every: std::env::var("REDACT_SKIP_FRAMES_EVERY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.skip_frames_every),
            debug: std::env::var("REDACT_DEBUG")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.debug),
        }
    }

    pub fn with_json_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.json_path = path.into();
        self
    }

    pub fn with_skip_frames_start(mut self, frames: usize) -> Self {
        self.skip_frames_start = frames;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_skip_frames_every(mut self, frames: usize) -> Self {
        self.skip_frames_every = frames;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Look up a parameter's metadata by name.
    pub fn param_info(name: &str) -> Option<&'static ParamInfo> {
        Self::PARAMS.iter().find(|info| info.name == name)
    }

    /// Set a parameter by its host name.
    ///
    /// # Errors
    ///
    /// - [`FilterError::UnknownParam`] for names not in [`Self::PARAMS`]
    /// - [`FilterError::InvalidParam`] for values of the wrong type, or
    ///   frame counts that are negative or not finite
    pub fn set_param(&mut self, name: &str, value: ParamValue) -> FilterResult<()> {
        match name {
            Self::JSON_PATH => match value {
                ParamValue::String(path) => self.json_path = PathBuf::from(path),
                other => return Err(mismatch(name, ParamKind::String, &other)),
            },
            Self::SKIP_FRAMES_START => self.skip_frames_start = frame_count(name, &value)?,
            Self::MIN_SCORE => match value {
                ParamValue::Double(score) if score.is_finite() => self.min_score = score,
                ParamValue::Double(score) => {
                    return Err(FilterError::invalid_param(name, format!("{score} is not finite")))
                }
                other => return Err(mismatch(name, ParamKind::Double, &other)),
            },
            Self::SKIP_FRAMES_EVERY => self.skip_frames_every = frame_count(name, &value)?,
            Self::DEBUG => match value {
                ParamValue::Bool(debug) => self.debug = debug,
                ParamValue::Double(v) => self.debug = v > 0.0,
                other => return Err(mismatch(name, ParamKind::Bool, &other)),
            },
            _ => return Err(FilterError::UnknownParam(name.to_string())),
        }
        Ok(())
    }

    /// Read a parameter by its host name, in its declared type.
    pub fn get_param(&self, name: &str) -> FilterResult<ParamValue> {
        let value = match name {
            Self::JSON_PATH => ParamValue::String(self.json_path.to_string_lossy().into_owned()),
            Self::SKIP_FRAMES_START => ParamValue::Double(self.skip_frames_start as f64),
            Self::MIN_SCORE => ParamValue::Double(self.min_score),
            Self::SKIP_FRAMES_EVERY => ParamValue::Double(self.skip_frames_every as f64),
            Self::DEBUG => ParamValue::Bool(self.debug),
            _ => return Err(FilterError::UnknownParam(name.to_string())),
        };
        Ok(value)
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig::new(self.json_path.clone())
            .with_skip_frames_start(self.skip_frames_start)
            .with_frames_to_skip_per_step(self.skip_frames_every.saturating_sub(1))
    }

    pub fn compositor_config(&self) -> CompositorConfig {
        CompositorConfig::default().with_min_score(self.min_score)
    }
}

fn mismatch(name: &str, expected: ParamKind, value: &ParamValue) -> FilterError {
    FilterError::invalid_param(
        name,
        format!("expected {:?}, got {:?}", expected, value.kind()),
    )
}

/// Largest frame count a host may set.
const MAX_FRAME_COUNT: f64 = u32::MAX as f64;

fn frame_count(name: &str, value: &ParamValue) -> FilterResult<usize> {
    match *value {
        ParamValue::Double(v) if v.is_finite() && v >= 0.0 => {
            Ok(v.round().min(MAX_FRAME_COUNT) as usize)
        }
        ParamValue::Double(v) => Err(FilterError::invalid_param(
            name,
            format!("{v} is not a valid frame count"),
        )),
        ref other => Err(mismatch(name, ParamKind::Double, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FilterConfig::default();
        assert_eq!(config.json_path, PathBuf::new());
        assert_eq!(config.skip_frames_start, 0);
        assert_eq!(config.min_score, 0.2);
        assert_eq!(config.skip_frames_every, 0);
        assert!(!config.debug);
    }

    #[test]
    fn test_params_are_registered_in_order() {
        let names: Vec<_> = FilterConfig::PARAMS.iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            ["jsonPath", "skipFramesStart", "minScore", "skipFramesEvery", "debug"]
        );
        assert_eq!(
            FilterConfig::param_info("debug").map(|p| p.kind),
            Some(ParamKind::Bool)
        );
    }

    #[test]
    fn test_set_and_get_params() {
        let mut config = FilterConfig::default();
        config
            .set_param("jsonPath", ParamValue::String("/v/clip.mp4".into()))
            .unwrap();
        config.set_param("skipFramesStart", ParamValue::Double(2.6)).unwrap();
        config.set_param("minScore", ParamValue::Double(0.5)).unwrap();
        config.set_param("skipFramesEvery", ParamValue::Double(14.0)).unwrap();
        config.set_param("debug", ParamValue::Double(1.0)).unwrap();

        assert_eq!(config.skip_frames_start, 3);
        assert_eq!(config.skip_frames_every, 14);

        config.set_param("skipFramesEvery", ParamValue::Double(1e30)).unwrap();
        assert_eq!(config.skip_frames_every, u32::MAX as usize);
        assert!(config.debug);
        assert_eq!(
            config.get_param("jsonPath").unwrap(),
            ParamValue::String("/v/clip.mp4".into())
        );
        assert_eq!(config.get_param("minScore").unwrap(), ParamValue::Double(0.5));
        assert_eq!(config.get_param("debug").unwrap(), ParamValue::Bool(true));
    }

    #[test]
    fn test_rejects_bad_params() {
        let mut config = FilterConfig::default();

        assert!(matches!(
            config.set_param("radius", ParamValue::Double(1.0)),
            Err(FilterError::UnknownParam(_))
        ));
        assert!(matches!(
            config.set_param("jsonPath", ParamValue::Double(1.0)),
            Err(FilterError::InvalidParam { .. })
        ));
        assert!(matches!(
            config.set_param("skipFramesStart", ParamValue::Double(-1.0)),
            Err(FilterError::InvalidParam { .. })
        ));
        assert!(matches!(
            config.set_param("minScore", ParamValue::Double(f64::NAN)),
            Err(FilterError::InvalidParam { .. })
        ));
        assert!(config.get_param("radius").is_err());
        assert_eq!(config, FilterConfig::default());
    }

    #[test]
    fn test_derived_configs() {
        let config = FilterConfig::default()
            .with_json_path("/v/clip.mp4")
            .with_skip_frames_start(4)
            .with_skip_frames_every(3)
            .with_min_score(0.7);

        let reader = config.reader_config();
        assert_eq!(reader.base_path, PathBuf::from("/v/clip.mp4"));
        assert_eq!(reader.skip_frames_start, 4);
        assert_eq!(reader.frames_to_skip_per_step, 2);

        for (every, per_step) in [(0, 0), (1, 0), (15, 14)] {
            let reader = FilterConfig::default().with_skip_frames_every(every).reader_config();
            assert_eq!(reader.frames_to_skip_per_step, per_step, "skipFramesEvery={every}");
        }

        let compositor = config.compositor_config();
        assert_eq!(compositor.min_score, 0.7);
        assert_eq!(compositor.min_mask_gap, 10);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: FilterConfig =
            serde_json::from_str(r#"{"json_path": "/v/clip.mp4", "debug": true}"#).unwrap();
        assert_eq!(config.json_path, PathBuf::from("/v/clip.mp4"));
        assert!(config.debug);
        assert_eq!(config.min_score, 0.2);
    }
}
