//! Local scan history: a bounded, newest-first list of past verdicts.
//!
//! Persistence is strictly best-effort — a history write failure is an
//! inconvenience, never a reason to fail the scan that produced the
//! result. When the obfuscated store runs out of room the thumbnail is
//! the first thing sacrificed.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::HISTORY_CAPACITY;
use crate::models::{
    IngredientDetail, IngredientVerdict, PreparedImage, ScanHistoryItem, ScanResult, ScanVerdict,
};
use crate::storage::{ObfuscatedKv, StorageBackend};

const HISTORY_KEY: &str = "scan_history";

pub struct HistoryStore {
    kv: ObfuscatedKv,
}

impl HistoryStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            kv: ObfuscatedKv::new(backend),
        }
    }

    /// Persist one result at the head of the history.
    ///
    /// Returns whether anything was persisted. Reported-failure sentinels
    /// (confidence 0) are refused outright. On a write failure with a
    /// thumbnail present, retries once with the thumbnail stripped; a
    /// second failure is logged and swallowed.
    pub fn append(&self, result: ScanResult, thumbnail: Option<PreparedImage>) -> bool {
        if result.is_reported_failure() {
            debug!("Refusing to persist a reported-failure sentinel");
            return false;
        }

        let mut items = self.load();
        items.insert(0, ScanHistoryItem::new(result, thumbnail));
        items.truncate(HISTORY_CAPACITY);

        match self.kv.put_json(HISTORY_KEY, &items) {
            Ok(()) => true,
            Err(first) => {
                if items[0].thumbnail.is_none() {
                    warn!(error = %first, "History write failed — entry dropped");
                    return false;
                }
                warn!(error = %first, "History write failed — retrying without the thumbnail");
                items[0].thumbnail = None;
                match self.kv.put_json(HISTORY_KEY, &items) {
                    Ok(()) => true,
                    Err(second) => {
                        warn!(error = %second, "History write failed again — entry dropped");
                        false
                    }
                }
            }
        }
    }

    /// Load the history, newest first.
    ///
    /// Tolerant: a record that no longer parses is skipped with a warning
    /// instead of poisoning the whole list, and records written by older
    /// releases (ingredient names without per-ingredient verdicts) are
    /// migrated on the fly.
    pub fn load(&self) -> Vec<ScanHistoryItem> {
        let raw: Vec<serde_json::Value> = match self.kv.get_json(HISTORY_KEY) {
            Some(values) => values,
            None => return Vec::new(),
        };

        raw.into_iter()
            .filter_map(|value| match serde_json::from_value::<RawHistoryItem>(value) {
                Ok(record) => Some(record.into_item()),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable history record");
                    None
                }
            })
            .collect()
    }

    pub fn clear(&self) {
        self.kv.remove(HISTORY_KEY);
    }
}

/// Persisted record shape, covering both the current layout and the
/// legacy one where `ingredientsDetected` was a plain list of names.
#[derive(Deserialize)]
struct RawHistoryItem {
    id: i64,
    timestamp: String,
    status: ScanVerdict,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    confidence: u8,
    #[serde(default, rename = "ingredientsDetected")]
    ingredients: RawIngredients,
    #[serde(default)]
    thumbnail: Option<PreparedImage>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIngredients {
    Detailed(Vec<IngredientDetail>),
    Legacy(Vec<String>),
}

impl Default for RawIngredients {
    fn default() -> Self {
        Self::Detailed(Vec::new())
    }
}

impl RawHistoryItem {
    fn into_item(self) -> ScanHistoryItem {
        let ingredients = match self.ingredients {
            RawIngredients::Detailed(list) => list,
            // Old records carried names only. The per-ingredient verdict
            // was introduced later; migrated entries default to HALAL.
            RawIngredients::Legacy(names) => names
                .into_iter()
                .map(|name| IngredientDetail {
                    name,
                    verdict: IngredientVerdict::Halal,
                })
                .collect(),
        };
        ScanHistoryItem {
            id: self.id,
            timestamp: self.timestamp,
            result: ScanResult {
                verdict: self.status,
                reason: self.reason,
                confidence: self.confidence,
                ingredients,
            },
            thumbnail: self.thumbnail,
        }
    }
}
