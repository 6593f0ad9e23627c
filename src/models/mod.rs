//! Core data model shared across the scan pipeline.

pub mod enums;
pub mod image_asset;
pub mod result;

pub use enums::*;
pub use image_asset::*;
pub use result::*;

use serde::{Deserialize, Serialize};

/// Opaque identity token supplied by the host's identity provider.
///
/// The pipeline never inspects the token — it only forwards it to the
/// classification backend and the entitlement store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityToken(pub String);

impl IdentityToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Locally cached or remotely fetched entitlement record for one identity.
///
/// Two copies exist at runtime: the optimistic cached copy (survives
/// restarts) and the authoritative remote copy. The cached copy is a
/// read-through cache, never the source of truth for enforcement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSnapshot {
    pub scan_count: u32,
    pub is_premium: bool,
    /// Identity the snapshot belongs to. `None` for the offline path.
    pub identity: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_defaults_are_restrictive() {
        let snap = EntitlementSnapshot::default();
        assert_eq!(snap.scan_count, 0);
        assert!(!snap.is_premium);
        assert!(snap.identity.is_none());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snap = EntitlementSnapshot {
            scan_count: 3,
            is_premium: true,
            identity: Some("anon-1".into()),
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"scanCount\":3"));
        assert!(json.contains("\"isPremium\":true"));
    }
}
