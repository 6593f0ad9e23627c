//! Entitlement reconciliation: "is this identity allowed to scan right
//! now", answered from an optimistic local cache that is always
//! superseded by the authoritative remote record once fetched.
//!
//! The local gate is a latency optimization for the UI, never a security
//! boundary — the classification backend enforces the real limit and may
//! reject independently with `LIMIT_REACHED`.

pub mod state;
pub mod store;

pub use state::EntitlementState;
pub use store::{HttpEntitlementStore, RemoteEntitlement};

use thiserror::Error;

use crate::models::IdentityToken;

#[derive(Error, Debug)]
pub enum EntitlementError {
    #[error("No identity is available yet: {0}")]
    IdentityUnavailable(String),

    #[error("The entitlement record could not be fetched: {0}")]
    Fetch(String),

    #[error("No entitlement record exists for this identity")]
    RecordMissing,

    #[error("The entitlement service rejected the request (HTTP {status}): {message}")]
    Api { status: u16, message: String },
}

/// Supplies the opaque identity token (anonymous or persistent).
///
/// Token acquisition is a prerequisite the pipeline waits on, not
/// something it implements — the host wires in its provider.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self) -> Result<IdentityToken, EntitlementError>;
}

/// The opaque remote per-identity record: read, and increment-only
/// writes that are idempotent-safe (safe to retry).
pub trait EntitlementStore: Send + Sync {
    fn fetch(&self, identity: &IdentityToken) -> Result<RemoteEntitlement, EntitlementError>;

    fn increment(&self, identity: &IdentityToken) -> Result<(), EntitlementError>;
}
