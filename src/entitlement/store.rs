//! HTTP entitlement store client.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::IdentityToken;

use super::{EntitlementError, EntitlementStore};

/// Authoritative remote entitlement record for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntitlement {
    pub scan_count: u32,
    pub is_premium: bool,
}

/// Entitlement store backed by the remote HTTP key-value record.
pub struct HttpEntitlementStore {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpEntitlementStore {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

impl EntitlementStore for HttpEntitlementStore {
    fn fetch(&self, identity: &IdentityToken) -> Result<RemoteEntitlement, EntitlementError> {
        let url = format!("{}/v1/entitlements", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(identity.as_str())
            .send()
            .map_err(|e| EntitlementError::Fetch(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(EntitlementError::RecordMissing);
        }
        if !status.is_success() {
            return Err(EntitlementError::Api {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        let record: RemoteEntitlement = response
            .json()
            .map_err(|e| EntitlementError::Fetch(e.to_string()))?;
        debug!(
            scan_count = record.scan_count,
            is_premium = record.is_premium,
            "Fetched authoritative entitlement record"
        );
        Ok(record)
    }

    fn increment(&self, identity: &IdentityToken) -> Result<(), EntitlementError> {
        let url = format!("{}/v1/entitlements/increment", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(identity.as_str())
            // Increment is idempotent-safe server-side; the key lets the
            // service deduplicate a retried request.
            .header("Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .send()
            .map_err(|e| EntitlementError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EntitlementError::Api {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }
}
