//! Forward-only "detections for the next frame" over a growing side file.

use std::path::{Path, PathBuf};

use redact_models::FrameDetections;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::backoff::{Backoff, Sleeper, ThreadSleeper};
use super::discovery::{find_side_file, SideFile};
use super::parse::{load_frame_table, FrameTable};
use crate::error::{MediaError, MediaResult};

/// Configuration for a detection stream reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Side file path; the known suffixes are probed after it
    pub base_path: PathBuf,
    /// Frames of the side file to ignore at the start
    pub skip_frames_start: usize,
    /// Side-file frames to skip after every processed frame, for
    /// decimated-frame-rate workflows
    pub frames_to_skip_per_step: usize,
    /// Wait schedule while the producer catches up
    pub backoff: Backoff,
}

impl ReaderConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            skip_frames_start: 0,
            frames_to_skip_per_step: 0,
            backoff: Backoff::default(),
        }
    }

    pub fn with_skip_frames_start(mut self, frames: usize) -> Self {
        self.skip_frames_start = frames;
        self
    }

    pub fn with_frames_to_skip_per_step(mut self, frames: usize) -> Self {
        self.frames_to_skip_per_step = frames;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Reads one frame's detections per call, strictly in file order.
///
/// When the loaded data runs out (or cannot be loaded) the reader assumes the
/// producer has not caught up, forgets the data, and reloads the file after
/// a backoff. It never seeks backward: after a reload it resumes at the
/// running frame counter.
pub struct DetectionStreamReader {
    config: ReaderConfig,
    table: Option<FrameTable>,
    side_file: Option<SideFile>,
    cursor: usize,
    frame_index: usize,
    retries: u32,
    sleeper: Box<dyn Sleeper>,
}

impl DetectionStreamReader {
    pub fn new(config: ReaderConfig) -> Self {
        let frame_index = config.skip_frames_start;
        Self {
            config,
            table: None,
            side_file: None,
            cursor: 0,
            frame_index,
            retries: 0,
            sleeper: Box::new(ThreadSleeper),
        }
    }

    /// Replace how the reader waits between retries.
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Index (in side-file frames) of the next frame to be returned.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Consecutive failed attempts since the last success.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The side file selected by the most recent load, if any.
    pub fn side_file(&self) -> Option<&SideFile> {
        self.side_file.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.table.is_some()
    }

    /// Detections for the next frame, blocking until they are available.
    ///
    /// Retries forever with capped exponential backoff; the only way out is
    /// for the producer to write the frame.
    pub fn next_frame_detections(&mut self) -> FrameDetections {
        loop {
            match self.try_next_frame_detections() {
                Ok(detections) => return detections,
                Err(e) => {
                    self.table = None;
                    self.retries = self.retries.saturating_add(1);
                    let wait = self.config.backoff.delay_for_attempt(self.retries);

                    let cause = if e.is_transient() { "unavailable" } else { "malformed" };
                    crate::metrics::record_stream_retry(cause);
                    warn!(
                        path = %self.display_path().display(),
                        frame = self.frame_index,
                        retries = self.retries,
                        wait_secs = wait.as_secs_f64(),
                        cause,
                        error = %e,
                        "Trying to blur more frames than there is detection data for, waiting before retry"
                    );

                    self.sleeper.sleep(wait);
                }
            }
        }
    }

    /// One attempt at reading the next frame, without waiting.
    ///
    /// # Errors
    ///
    /// Any load error, or [`MediaError::StreamExhausted`] when the loaded
    /// data ends before the current frame. On exhaustion the loaded data is
    /// dropped so the next attempt reloads the file.
    pub fn try_next_frame_detections(&mut self) -> MediaResult<FrameDetections> {
        if self.table.is_none() {
            self.load()?;
        }

        let frame = self.frame_index;
        let cursor = self.cursor;
        let Some(table) = self.table.as_mut() else {
            return Err(MediaError::internal("frame table missing after load"));
        };

        if cursor >= table.len() {
            let available = table.len();
            self.table = None;
            return Err(MediaError::StreamExhausted { frame, available });
        }

        let detections = table.take(cursor).unwrap_or_default();
        let step = self.config.frames_to_skip_per_step.saturating_add(1);
        self.cursor = self.cursor.saturating_add(step);
        self.frame_index = self.frame_index.saturating_add(step);
        self.retries = 0;

        Ok(detections)
    }

    /// (Re)load the side file and position the cursor at the frame counter.
    fn load(&mut self) -> MediaResult<()> {
        let side_file = find_side_file(&self.config.base_path)?;

        if self.side_file.as_ref() != Some(&side_file) {
            info!(
                path = %side_file.path.display(),
                compression = %side_file.compression,
                in_progress = side_file.is_in_progress(),
                "Loading detections from side file"
            );
        }

        let table = load_frame_table(&side_file)?;
        debug!(
            path = %side_file.path.display(),
            frames = table.len(),
            resume_at = self.frame_index,
            "Loaded side file"
        );

        self.side_file = Some(side_file);
        self.cursor = self.frame_index;
        self.table = Some(table);
        Ok(())
    }

    fn display_path(&self) -> &Path {
        self.side_file
            .as_ref()
            .map(|f| f.path.as_path())
            .unwrap_or(self.config.base_path.as_path())
    }
}

impl std::fmt::Debug for DetectionStreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionStreamReader")
            .field("config", &self.config)
            .field("side_file", &self.side_file)
            .field("loaded_frames", &self.table.as_ref().map(FrameTable::len))
            .field("cursor", &self.cursor)
            .field("frame_index", &self.frame_index)
            .field("retries", &self.retries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redact_models::Detection;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Side file whose frame `i` holds `i + 1` detections, so frames are
    /// identifiable by their length.
    fn side_file_json(frames: usize) -> String {
        let entries: Vec<String> = (0..frames)
            .map(|i| {
                let dets: Vec<String> = (0..=i)
                    .map(|_| {
                        r#"{"score":1,"x_min":0,"y_min":0,"x_max":4,"y_max":4,"kind":"face"}"#
                            .to_string()
                    })
                    .collect();
                format!("\"{}\": [{}]", i, dets.join(","))
            })
            .collect();
        format!("{{{}}}", entries.join(","))
    }

    fn frame_number(detections: &[Detection]) -> usize {
        detections.len() - 1
    }

    /// Records waits and runs a hook on each one, standing in for the producer.
    struct ScriptedSleeper {
        waits: Arc<Mutex<Vec<Duration>>>,
        on_sleep: Box<dyn FnMut(usize) + Send>,
    }

    impl Sleeper for ScriptedSleeper {
        fn sleep(&mut self, duration: Duration) {
            let mut waits = self.waits.lock().unwrap();
            waits.push(duration);
            (self.on_sleep)(waits.len());
        }
    }

    fn fast_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(1), Duration::from_millis(8))
    }

    #[test]
    fn test_reads_frames_in_order() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("clip");
        fs::write(dir.path().join("clip.json_wip"), side_file_json(4)).unwrap();

        let mut reader = DetectionStreamReader::new(ReaderConfig::new(&base));
        for expected in 0..4 {
            let detections = reader.try_next_frame_detections().unwrap();
            assert_eq!(frame_number(&detections), expected);
        }
        assert_eq!(reader.frame_index(), 4);
        assert!(matches!(
            reader.try_next_frame_detections(),
            Err(MediaError::StreamExhausted { frame: 4, available: 4 })
        ));
        assert!(!reader.is_loaded());
    }

    #[test]
    fn test_skip_start_and_per_step() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("clip");
        fs::write(dir.path().join("clip.json_wip"), side_file_json(10)).unwrap();

        let config = ReaderConfig::new(&base)
            .with_skip_frames_start(1)
            .with_frames_to_skip_per_step(2);
        let mut reader = DetectionStreamReader::new(config);

        let seen: Vec<usize> = (0..3)
            .map(|_| frame_number(&reader.try_next_frame_detections().unwrap()))
            .collect();
        assert_eq!(seen, vec![1, 4, 7]);
        assert_eq!(reader.frame_index(), 10);
    }

    #[test]
    fn test_huge_step_saturates_instead_of_overflowing() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("clip");
        fs::write(dir.path().join("clip.json_wip"), side_file_json(2)).unwrap();

        let config = ReaderConfig::new(&base).with_frames_to_skip_per_step(usize::MAX);
        let mut reader = DetectionStreamReader::new(config);

        assert_eq!(frame_number(&reader.try_next_frame_detections().unwrap()), 0);
        assert_eq!(reader.frame_index(), usize::MAX);
        assert!(matches!(
            reader.try_next_frame_detections(),
            Err(MediaError::StreamExhausted { frame: usize::MAX, .. })
        ));
    }

    #[test]
    fn test_resumes_after_reload_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("clip");
        let path = dir.path().join("clip.json_wip");
        fs::write(&path, side_file_json(2)).unwrap();

        let mut reader = DetectionStreamReader::new(ReaderConfig::new(&base));
        reader.try_next_frame_detections().unwrap();
        reader.try_next_frame_detections().unwrap();
        assert!(reader.try_next_frame_detections().is_err());

        // Producer appends a frame
        fs::write(&path, side_file_json(3)).unwrap();
        let detections = reader.try_next_frame_detections().unwrap();
        assert_eq!(frame_number(&detections), 2);
    }

    #[test]
    fn test_blocks_until_producer_writes() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("clip");
        let final_path = dir.path().join("clip.json.gz");
        let waits = Arc::new(Mutex::new(Vec::new()));

        let sleeper = ScriptedSleeper {
            waits: Arc::clone(&waits),
            on_sleep: Box::new(move |attempt| {
                if attempt == 3 {
                    let mut encoder = flate2::write::GzEncoder::new(
                        fs::File::create(&final_path).unwrap(),
                        flate2::Compression::fast(),
                    );
                    std::io::Write::write_all(&mut encoder, side_file_json(1).as_bytes()).unwrap();
                    encoder.finish().unwrap();
                }
            }),
        };

        let config = ReaderConfig::new(&base).with_backoff(fast_backoff());
        let mut reader = DetectionStreamReader::new(config).with_sleeper(sleeper);

        let detections = reader.next_frame_detections();
        assert_eq!(frame_number(&detections), 0);
        assert_eq!(reader.retries(), 0);
        assert_eq!(
            reader.side_file().unwrap().compression,
            crate::stream::Compression::Gzip
        );
        assert_eq!(
            *waits.lock().unwrap(),
            vec![
                Duration::from_millis(2),
                Duration::from_millis(4),
                Duration::from_millis(8)
            ]
        );
    }

    #[test]
    fn test_malformed_file_is_retried() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("clip");
        let path = dir.path().join("clip.json_wip");
        fs::write(&path, "[1, 2, 3]").unwrap();

        let waits = Arc::new(Mutex::new(Vec::new()));
        let fixed_path = path.clone();
        let sleeper = ScriptedSleeper {
            waits: Arc::clone(&waits),
            on_sleep: Box::new(move |_| {
                fs::write(&fixed_path, side_file_json(1)).unwrap();
            }),
        };

        let mut reader = DetectionStreamReader::new(ReaderConfig::new(&base).with_backoff(fast_backoff()))
            .with_sleeper(sleeper);

        assert_eq!(frame_number(&reader.next_frame_detections()), 0);
        assert_eq!(waits.lock().unwrap().len(), 1);
    }
}
