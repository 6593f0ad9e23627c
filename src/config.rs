use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "HalalScan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of free scans before the premium gate closes.
///
/// Client-side UX gate only — the classification backend enforces the
/// authoritative limit and may reject independently with `LIMIT_REACHED`.
pub const FREE_SCAN_LIMIT: u32 = 10;

/// Maximum number of images a single scan request may carry.
pub const MAX_IMAGES_PER_SCAN: usize = 4;

/// Maximum history entries retained locally (oldest evicted first).
pub const HISTORY_CAPACITY: usize = 30;

/// Thumbnail bound and JPEG quality for history entries.
pub const THUMBNAIL_MAX_DIM: u32 = 200;
pub const THUMBNAIL_JPEG_QUALITY: u8 = 60;

/// Get the application data directory.
/// ~/HalalScan/ on all platforms (user-visible, per design requirement).
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("HalalScan")
}

/// Directory for the obfuscated key-value store files.
pub fn storage_dir() -> PathBuf {
    app_data_dir().join("store")
}

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> String {
    "info,halalscan=debug".to_string()
}
