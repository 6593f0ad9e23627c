//! Single-flight guard for scan attempts.
//!
//! The pipeline never queues: while one attempt is in flight every other
//! trigger is ignored at the door. The caller holds one
//! [`ScanSessionState`] and brackets each attempt with `try_begin`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

#[derive(Debug, Default)]
pub struct ScanSessionState {
    busy: AtomicBool,
}

impl ScanSessionState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Claim the in-flight slot. `None` means another attempt is running
    /// and this trigger should be dropped silently.
    pub fn try_begin(self: &Arc<Self>) -> Option<ScanGuard> {
        if self.busy.swap(true, Ordering::SeqCst) {
            debug!("Scan trigger ignored — an attempt is already in flight");
            return None;
        }
        Some(ScanGuard {
            session: Arc::clone(self),
        })
    }
}

/// Releases the in-flight slot on drop, covering every exit path.
pub struct ScanGuard {
    session: Arc<ScanSessionState>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.session.busy.store(false, Ordering::SeqCst);
    }
}
