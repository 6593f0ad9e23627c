//! Obfuscated key-value layer over a [`StorageBackend`].
//!
//! Obfuscation keeps persisted entitlement flags and history out of
//! casual view; it is explicitly NOT a security boundary (the
//! authoritative entitlement record lives remotely). Any decode or parse
//! failure falls back to "value absent" rather than raising — tampered or
//! corrupt state must never take the pipeline down.

use std::sync::Arc;

use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::{StorageBackend, StorageError};

/// Rolling XOR key. Obfuscation only — trivially reversible on purpose.
const OBFUSCATION_KEY: &[u8] = b"halalscan-local-state-v1";

fn xor_rolling(data: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, b)| b ^ OBFUSCATION_KEY[i % OBFUSCATION_KEY.len()])
        .collect()
}

/// Obfuscate a plaintext value for storage.
pub fn obfuscate(plain: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(xor_rolling(plain.as_bytes()))
}

/// Reverse [`obfuscate`]. Returns `None` on any corruption.
pub fn deobfuscate(stored: &str) -> Option<String> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(stored.trim())
        .ok()?;
    String::from_utf8(xor_rolling(&raw)).ok()
}

/// Typed, obfuscated view over a storage backend.
pub struct ObfuscatedKv {
    backend: Arc<dyn StorageBackend>,
}

impl ObfuscatedKv {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Read and deserialize a value. Corruption at any layer (transport
    /// encoding, obfuscation, JSON shape) degrades to `None`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let stored = self.backend.read(key)?;
        let plain = match deobfuscate(&stored) {
            Some(p) => p,
            None => {
                warn!(key, "Persisted value is corrupt — falling back to defaults");
                return None;
            }
        };
        match serde_json::from_str(&plain) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "Persisted value failed to parse — falling back to defaults");
                None
            }
        }
    }

    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let plain = serde_json::to_string(value).map_err(|e| StorageError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.backend.write(key, &obfuscate(&plain))
    }

    pub fn remove(&self, key: &str) {
        self.backend.remove(key);
    }
}
