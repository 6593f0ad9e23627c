//! Local persisted state: an obfuscated (not cryptographically secure)
//! key-value layer, tolerant of tampering and corruption.
//!
//! The backend trait exists so tests can inject write failures — the
//! history store must survive a storage-quota failure mid-append.

pub mod kv;

pub use kv::ObfuscatedKv;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Could not write '{key}' to local storage: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Local storage is full — could not write '{0}'")]
    QuotaExceeded(String),
}

/// Flat string-to-string persistence surface.
///
/// `read` never fails: unreadable state is indistinguishable from absent
/// state, and every caller must fall back to defaults either way.
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str);
}

// ──────────────────────────────────────────────
// FileStorage — one file per key
// ──────────────────────────────────────────────

/// File-backed storage: one file per key under a storage directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Storage rooted at the default application directory.
    pub fn default_location() -> Self {
        Self::new(crate::config::storage_dir())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal constants, but never trust them as raw paths.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.dat"))
    }
}

impl StorageBackend for FileStorage {
    fn read(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(self.path_for(key), value).map_err(|e| StorageError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}

// ──────────────────────────────────────────────
// MemoryStorage — tests and ephemeral hosts
// ──────────────────────────────────────────────

/// In-memory storage with injectable write failure.
///
/// `fail_next_writes(n)` makes the next `n` writes fail with
/// [`StorageError::QuotaExceeded`] — this is how the thumbnail-strip
/// retry path in the history store is exercised.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    failures_remaining: Mutex<u32>,
    /// Optional cap on value length, simulating a quota-bounded host store.
    max_value_len: Mutex<Option<usize>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_writes(&self, n: u32) {
        *self.failures_remaining.lock().unwrap() = n;
    }

    pub fn set_max_value_len(&self, limit: Option<usize>) {
        *self.max_value_len.lock().unwrap() = limit;
    }
}

impl StorageBackend for MemoryStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        {
            let mut failures = self.failures_remaining.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(StorageError::QuotaExceeded(key.to_string()));
            }
        }
        if let Some(limit) = *self.max_value_len.lock().unwrap() {
            if value.len() > limit {
                return Err(StorageError::QuotaExceeded(key.to_string()));
            }
        }
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }
}
