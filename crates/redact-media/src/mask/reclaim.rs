//! Idle reclamation of the mask cache.
//!
//! The cache is sized for active encoding sessions. Once frames stop
//! arriving for a while, a watcher clears it and exits; the next frame
//! starts a new watcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Sender};
use tracing::trace;

use super::cache::MaskCache;

/// Handle to a running idle watcher thread.
pub(crate) struct IdleWatcher {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

/// Clears the running flag however the watcher thread exits.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl IdleWatcher {
    /// Start watching `cache` for inactivity.
    ///
    /// Only a weak reference is held, so dropping the last cache handle also
    /// ends the watcher.
    pub(crate) fn spawn(
        cache: Weak<MaskCache>,
        running: Arc<AtomicBool>,
        timeout: Duration,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        running.store(true, Ordering::Release);
        let guard = RunningGuard(running);

        let handle = thread::Builder::new()
            .name("mask-cache-idle".to_string())
            .spawn(move || {
                let _guard = guard;
                let ticker = tick(interval);

                let mut last_ticks = match cache.upgrade() {
                    Some(cache) => cache.ticks(),
                    None => return,
                };
                let mut last_activity = Instant::now();

                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let Some(cache) = cache.upgrade() else {
                                break;
                            };

                            let ticks = cache.ticks();
                            if ticks != last_ticks {
                                last_ticks = ticks;
                                last_activity = Instant::now();
                                continue;
                            }

                            let idle_for = last_activity.elapsed();
                            if idle_for >= timeout {
                                cache.reclaim_idle(idle_for);
                                break;
                            }
                            trace!(idle_ms = idle_for.as_millis() as u64, "Mask cache idle");
                        }
                    }
                }
            })?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Ask the watcher to exit and wait for it.
    pub(crate) fn stop(mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
