//! Quantized LRU cache of masks shared by all filter instances.
//!
//! The whole lookup-or-build-and-insert sequence runs under a single lock.
//! Building a mask dominates the time the lock is held, and serializing it
//! means two instances asking for the same size never build it twice.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::reclaim::IdleWatcher;
use super::{CornerRatio, MaskEntry, MaskGenerator, MaskKey};
use crate::error::{MediaError, MediaResult};

/// Process-wide cache for hosts that have nowhere to keep one.
static SHARED_CACHE: OnceLock<Arc<MaskCache>> = OnceLock::new();

/// Configuration for the mask cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskCacheConfig {
    /// Maximum number of cached masks (default: 500)
    pub capacity: usize,
    /// Sizes are rounded up to a multiple of this many pixels (default: 5)
    pub quantum: u32,
    /// Clear the cache after this long without frame activity (default: 60s).
    /// `None` keeps masks until evicted.
    pub idle_timeout: Option<Duration>,
    /// How often the idle watcher checks for activity (default: 1s)
    pub idle_check_interval: Duration,
    /// Mask shape parameters
    pub generator: MaskGenerator,
}

impl Default for MaskCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            quantum: 5,
            idle_timeout: Some(Duration::from_secs(60)),
            idle_check_interval: Duration::from_secs(1),
            generator: MaskGenerator::default(),
        }
    }
}

impl MaskCacheConfig {
    /// Set the maximum number of cached masks.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the size quantum.
    pub fn with_quantum(mut self, quantum: u32) -> Self {
        self.quantum = quantum;
        self
    }

    /// Set (or disable) idle reclamation.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the idle watcher polling interval.
    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    /// Number of masks built
    pub misses: u64,
    pub evictions: u64,
    /// Number of idle clears
    pub reclaims: u64,
}

/// The map and its recency list. Every key in one is in the other exactly once.
#[derive(Default)]
struct CacheInner {
    entries: HashMap<MaskKey, MaskEntry>,
    /// Front is most recently used
    recency: VecDeque<MaskKey>,
}

impl CacheInner {
    fn promote(&mut self, key: &MaskKey) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if pos != 0 {
                if let Some(k) = self.recency.remove(pos) {
                    self.recency.push_front(k);
                }
            }
        }
    }

    fn evict_oldest(&mut self) -> Option<MaskKey> {
        let key = self.recency.pop_back()?;
        self.entries.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }
}

/// Thread-safe, LRU-bounded store of feathered masks.
pub struct MaskCache {
    config: MaskCacheConfig,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    reclaims: AtomicU64,
    /// Bumped on every frame; the idle watcher compares snapshots of it
    ticks: AtomicU64,
    watcher: Mutex<Option<IdleWatcher>>,
    watcher_running: Arc<AtomicBool>,
}

impl MaskCache {
    /// Create a new, empty cache.
    pub fn new(config: MaskCacheConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            inner: Mutex::new(CacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            reclaims: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            watcher: Mutex::new(None),
            watcher_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The lazily created process-wide cache with default configuration.
    pub fn shared() -> Arc<Self> {
        SHARED_CACHE
            .get_or_init(|| Self::new(MaskCacheConfig::default()))
            .clone()
    }

    pub fn config(&self) -> &MaskCacheConfig {
        &self.config
    }

    /// Round a dimension up to the next multiple of the quantum.
    pub fn quantize(&self, dimension: u32) -> u32 {
        let quantum = self.config.quantum.max(1);
        dimension.div_ceil(quantum) * quantum
    }

    /// Cache key for a detection size.
    pub fn key_for(&self, width: u32, height: u32, corner_ratio: CornerRatio) -> MaskKey {
        MaskKey {
            width: self.quantize(width),
            height: self.quantize(height),
            corner_ratio,
        }
    }

    /// Fetch the mask for a detection size, building it on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::InvalidGeometry`] for non-positive dimensions.
    pub fn get_or_create(
        &self,
        width: i32,
        height: i32,
        corner_ratio: CornerRatio,
    ) -> MediaResult<MaskEntry> {
        if width <= 0 || height <= 0 {
            return Err(MediaError::invalid_geometry(format!(
                "mask size must be positive, got {}x{}",
                width, height
            )));
        }

        let key = self.key_for(width as u32, height as u32, corner_ratio);
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.entries.get(&key).cloned() {
            inner.promote(&key);
            self.hits.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_cache_hit();
            return Ok(entry);
        }

        let entry = self
            .config
            .generator
            .generate(key.width, key.height, key.corner_ratio);
        self.misses.fetch_add(1, Ordering::Relaxed);

        inner.recency.push_front(key);
        inner.entries.insert(key, entry.clone());

        while inner.entries.len() > self.config.capacity {
            match inner.evict_oldest() {
                Some(evicted) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_cache_eviction();
                    debug!(
                        width = evicted.width,
                        height = evicted.height,
                        "Evicted least recently used mask"
                    );
                }
                None => break,
            }
        }

        crate::metrics::record_cache_miss(inner.entries.len());
        debug!(
            width = key.width,
            height = key.height,
            corner_ratio = key.corner_ratio.value(),
            entries = inner.entries.len(),
            "Built mask"
        );

        Ok(entry)
    }

    /// Whether a (quantized) key is cached.
    pub fn contains(&self, key: &MaskKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached keys, most recently used first.
    pub fn keys_by_recency(&self) -> Vec<MaskKey> {
        self.inner.lock().recency.iter().copied().collect()
    }

    /// Drop every cached mask.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            reclaims: self.reclaims.load(Ordering::Relaxed),
        }
    }

    /// Record frame activity and make sure the idle watcher is running.
    pub fn touch(self: &Arc<Self>) {
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let Some(timeout) = self.config.idle_timeout else {
            return;
        };
        if self.watcher_running.load(Ordering::Acquire) {
            return;
        }

        let mut slot = self.watcher.lock();
        if self.watcher_running.load(Ordering::Acquire) {
            return;
        }

        match IdleWatcher::spawn(
            Arc::downgrade(self),
            Arc::clone(&self.watcher_running),
            timeout,
            self.config.idle_check_interval,
        ) {
            Ok(watcher) => {
                // The previous watcher, if any, has already exited
                *slot = Some(watcher);
            }
            Err(e) => warn!(error = %e, "Failed to start mask cache idle watcher"),
        }
    }

    /// Whether the idle watcher is currently running.
    pub fn is_idle_watcher_running(&self) -> bool {
        self.watcher_running.load(Ordering::Acquire)
    }

    /// Stop the idle watcher and wait for it to exit.
    pub fn stop_idle_watcher(&self) {
        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            watcher.stop();
        }
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Called by the idle watcher when no frame arrived for the timeout.
    pub(crate) fn reclaim_idle(&self, idle_for: Duration) {
        let released = {
            let mut inner = self.inner.lock();
            let released = inner.entries.len();
            inner.clear();
            released
        };
        self.reclaims.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_reclaim();
        info!(
            released,
            idle_secs = idle_for.as_secs(),
            "Cleared idle mask cache"
        );
    }
}

impl std::fmt::Debug for MaskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
