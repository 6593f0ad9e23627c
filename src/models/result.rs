use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::enums::{IngredientVerdict, ScanVerdict};
use super::image_asset::PreparedImage;

/// One detected ingredient with its own verdict.
///
/// A [`ScanResult`] owns an ordered set of these — insertion order is
/// preserved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientDetail {
    pub name: String,
    #[serde(rename = "status")]
    pub verdict: IngredientVerdict,
}

/// Structured classification produced by the backend, or synthesized
/// locally on failure. Immutable once produced.
///
/// `confidence` lives in `[0, 100]`; `0` is reserved as a sentinel meaning
/// "this is actually an error, not a real classification" — such results
/// are never persisted to history and never consume a quota unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    #[serde(rename = "status")]
    pub verdict: ScanVerdict,
    /// Human-readable explanation. For a reported failure (confidence 0)
    /// this carries the user-facing error message.
    pub reason: String,
    pub confidence: u8,
    #[serde(rename = "ingredientsDetected", default)]
    pub ingredients: Vec<IngredientDetail>,
}

impl ScanResult {
    /// Whether this result is the reported-failure sentinel.
    pub fn is_reported_failure(&self) -> bool {
        self.confidence == 0
    }
}

/// One entry in the local scan history.
///
/// Created on every successful (confidence != 0) scan; never mutated
/// afterwards; evicted oldest-first once the store exceeds its capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryItem {
    /// Time-derived id (epoch milliseconds at creation).
    pub id: i64,
    /// RFC 3339 creation timestamp.
    pub timestamp: String,
    #[serde(flatten)]
    pub result: ScanResult,
    /// Small JPEG copy for the history list. Stripped when persistence
    /// runs out of room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<PreparedImage>,
}

impl ScanHistoryItem {
    pub fn new(result: ScanResult, thumbnail: Option<PreparedImage>) -> Self {
        let now = Utc::now();
        Self {
            id: now.timestamp_millis(),
            timestamp: now.to_rfc3339(),
            result,
            thumbnail,
        }
    }
}
