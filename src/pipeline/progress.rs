//! Synthetic scan progress.
//!
//! The classification round-trip gives no intermediate feedback, so a
//! ticker thread drives a purely local progress value: fast early
//! movement that decays as it approaches a ceiling below 100, so the bar
//! never stalls at an arbitrary spot and never claims completion before
//! the response arrives. The real response clamps it to exactly 100; an
//! error resets it to 0.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::trace;

/// The synthetic value never passes this before a real response.
const PROGRESS_CEILING: u32 = 95;

/// Shared progress handle. Monotonic within one attempt: concurrent
/// writers race through `fetch_max`, so a slow ticker tick can never pull
/// a newer value backwards.
#[derive(Debug, Default)]
pub struct ScanProgress {
    value: AtomicU32,
}

impl ScanProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current value in `0..=100`.
    pub fn value(&self) -> u32 {
        self.value.load(Ordering::SeqCst)
    }

    /// One ticker step: close a fraction of the remaining distance to the
    /// ceiling, always moving by at least 1 until the ceiling is reached.
    fn advance(&self) {
        let current = self.value.load(Ordering::SeqCst);
        if current >= PROGRESS_CEILING {
            return;
        }
        let step = ((PROGRESS_CEILING - current) / 8).max(1);
        let next = (current + step).min(PROGRESS_CEILING);
        self.value.fetch_max(next, Ordering::SeqCst);
        trace!(progress = next, "Synthetic progress tick");
    }

    /// The response arrived: clamp to exactly 100.
    pub fn complete(&self) {
        self.value.store(100, Ordering::SeqCst);
    }

    /// The attempt failed: back to 0 so the next attempt starts clean.
    pub fn reset(&self) {
        self.value.store(0, Ordering::SeqCst);
    }

    /// Spawn the ticker thread. The returned guard stops it when dropped,
    /// covering every exit path of the attempt including panics and `?`.
    pub fn start_ticker(self: &Arc<Self>, interval: Duration) -> TickerGuard {
        let stop = Arc::new(AtomicBool::new(false));
        let progress = Arc::clone(self);
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::SeqCst) {
                progress.advance();
                std::thread::sleep(interval);
            }
        });
        TickerGuard {
            stop,
            handle: Some(handle),
        }
    }
}

/// Stops the ticker thread on drop.
pub struct TickerGuard {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
