//! HalalScan client-side scan pipeline.
//!
//! A user photographs or types a food product's ingredient list and
//! receives a halal/haram/doubtful classification, subject to a free-usage
//! quota and a premium entitlement override. The classification itself is
//! delegated to an opaque remote backend; this crate owns everything in
//! front of it:
//!
//! - [`capture`] — camera stream acquisition with graceful degradation
//! - [`pipeline`] — image preparation, request orchestration, progress
//! - [`entitlement`] — quota snapshot reconciliation (optimistic cache)
//! - [`history`] — capacity-bounded local log of past scan results
//! - [`storage`] — obfuscated, corruption-tolerant key-value persistence

pub mod capture;
pub mod config;
pub mod entitlement;
pub mod history;
pub mod models;
pub mod pipeline;
pub mod storage;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for a host application embedding the pipeline.
///
/// Respects `RUST_LOG`; falls back to [`config::default_log_filter`].
/// Call once at process start — repeated calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
