//! Metrics emitted by the blur engine.
//!
//! Recorded through the `metrics` facade; the host decides whether and how
//! to export them.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    // Mask cache
    pub const MASK_CACHE_HITS_TOTAL: &str = "redact_mask_cache_hits_total";
    pub const MASK_CACHE_MISSES_TOTAL: &str = "redact_mask_cache_misses_total";
    pub const MASK_CACHE_EVICTIONS_TOTAL: &str = "redact_mask_cache_evictions_total";
    pub const MASK_CACHE_ENTRIES: &str = "redact_mask_cache_entries";
    pub const MASK_CACHE_RECLAIMS_TOTAL: &str = "redact_mask_cache_reclaims_total";

    // Detection stream
    pub const STREAM_RETRIES_TOTAL: &str = "redact_stream_retries_total";

    // Frames
    pub const FRAMES_PROCESSED_TOTAL: &str = "redact_frames_processed_total";
    pub const REGIONS_BLURRED_TOTAL: &str = "redact_regions_blurred_total";
}

pub fn record_cache_hit() {
    counter!(names::MASK_CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss(entries: usize) {
    counter!(names::MASK_CACHE_MISSES_TOTAL).increment(1);
    gauge!(names::MASK_CACHE_ENTRIES).set(entries as f64);
}

pub fn record_cache_eviction() {
    counter!(names::MASK_CACHE_EVICTIONS_TOTAL).increment(1);
}

pub fn record_cache_reclaim() {
    counter!(names::MASK_CACHE_RECLAIMS_TOTAL).increment(1);
    gauge!(names::MASK_CACHE_ENTRIES).set(0.0);
}

/// Record a retry of the detection stream, labelled by cause.
pub fn record_stream_retry(cause: &'static str) {
    let labels = [("cause", cause)];
    counter!(names::STREAM_RETRIES_TOTAL, &labels).increment(1);
}

/// Record one processed frame and how many regions were blurred on it.
pub fn record_frame(regions_blurred: usize) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(1);
    counter!(names::REGIONS_BLURRED_TOTAL).increment(regions_blurred as u64);
}
