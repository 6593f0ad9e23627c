//! The optimistic entitlement snapshot and its reconciliation rules.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::config::FREE_SCAN_LIMIT;
use crate::models::{EntitlementSnapshot, IdentityToken};
use crate::storage::{ObfuscatedKv, StorageBackend};

use super::{EntitlementError, EntitlementStore, IdentityProvider};

const ENTITLEMENT_KEY: &str = "entitlements";

/// Reconciles the locally cached premium/quota snapshot with the
/// authoritative remote record.
///
/// Ordering rule: every mutation carries the sequence number of the scan
/// that triggered it. A remote refresh result that resolves late — after
/// a more recent scan already updated the snapshot — is discarded
/// (last-writer-wins by recency of the triggering scan, not call order).
pub struct EntitlementState {
    snapshot: RwLock<EntitlementSnapshot>,
    cache: ObfuscatedKv,
    store: Arc<dyn EntitlementStore>,
    identity: Arc<dyn IdentityProvider>,
    /// Sequence of the most recent successful scan.
    scan_seq: AtomicU64,
    /// Sequence carried by the last applied snapshot write.
    applied_seq: AtomicU64,
    /// Whether a pure local identity with no remote record scans
    /// unmetered. Off by default — ambiguity fails restrictive.
    offline_unmetered: bool,
}

impl EntitlementState {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        let cache = ObfuscatedKv::new(storage);
        let snapshot = cache
            .get_json::<EntitlementSnapshot>(ENTITLEMENT_KEY)
            .unwrap_or_default();
        Self {
            snapshot: RwLock::new(snapshot),
            cache,
            store,
            identity,
            scan_seq: AtomicU64::new(0),
            applied_seq: AtomicU64::new(0),
            offline_unmetered: false,
        }
    }

    /// Opt in to the unmetered offline fallback path.
    pub fn with_offline_unmetered(mut self, unmetered: bool) -> Self {
        self.offline_unmetered = unmetered;
        self
    }

    /// Current snapshot (cached, possibly stale).
    pub fn snapshot(&self) -> EntitlementSnapshot {
        self.snapshot.read().expect("entitlement lock poisoned").clone()
    }

    /// Expose the possibly-stale cached snapshot immediately for a
    /// responsive UI, while resolving identity and fetching the
    /// authoritative record in the background. The remote result, once
    /// it lands, overwrites both memory and cache.
    pub fn bootstrap(self: &Arc<Self>) -> EntitlementSnapshot {
        let cached = self.snapshot();
        let this = Arc::clone(self);
        std::thread::spawn(move || match this.identity.resolve() {
            Ok(token) => {
                if let Err(e) = this.refresh(&token) {
                    warn!(error = %e, "Bootstrap entitlement fetch failed — staying on cache");
                }
            }
            Err(e) => {
                warn!(error = %e, "Identity resolution failed — staying on cached entitlements");
            }
        });
        cached
    }

    /// The pre-flight gate: `premium || scan_count < FREE_SCAN_LIMIT`.
    ///
    /// A UX gate only — the remote endpoint makes the authoritative
    /// decision and its limit rejection is handled identically upstream.
    pub fn can_scan(&self) -> bool {
        let snap = self.snapshot();
        if snap.identity.is_none() && self.offline_unmetered {
            return true;
        }
        snap.is_premium || snap.scan_count < FREE_SCAN_LIMIT
    }

    /// Re-fetch the authoritative record. On any failure the last-known
    /// cached value keeps answering `can_scan` — never a crash, never a
    /// silent grant of unlimited access.
    pub fn refresh(&self, identity: &IdentityToken) -> Result<(), EntitlementError> {
        self.refresh_with_seq(identity, self.scan_seq.load(Ordering::SeqCst))
    }

    fn refresh_with_seq(&self, identity: &IdentityToken, seq: u64) -> Result<(), EntitlementError> {
        let remote = self.store.fetch(identity)?;
        let applied = self.apply_snapshot(
            EntitlementSnapshot {
                scan_count: remote.scan_count,
                is_premium: remote.is_premium,
                identity: Some(identity.as_str().to_string()),
            },
            seq,
        );
        if applied {
            info!(
                scan_count = remote.scan_count,
                is_premium = remote.is_premium,
                "Entitlement snapshot reconciled with remote record"
            );
        }
        Ok(())
    }

    /// Optimistic local increment — the offline path only (no
    /// identity/remote record). Ordered against refresh results by the
    /// triggering scan's sequence.
    pub fn record_local_increment(&self) {
        let seq = self.scan_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut snap = self.snapshot();
        snap.scan_count += 1;
        self.apply_snapshot(snap, seq);
    }

    /// Called by the orchestrator after every successful (confidence != 0)
    /// scan: remote increment-then-refetch when an identity exists, local
    /// increment otherwise.
    pub fn after_successful_scan(&self, identity: Option<&IdentityToken>) {
        match identity {
            Some(token) => {
                let seq = self.scan_seq.fetch_add(1, Ordering::SeqCst) + 1;
                if let Err(e) = self.store.increment(token) {
                    warn!(error = %e, "Remote scan-count increment failed");
                }
                if let Err(e) = self.refresh_with_seq(token, seq) {
                    warn!(error = %e, "Post-scan entitlement refresh failed — keeping cached snapshot");
                }
            }
            None => self.record_local_increment(),
        }
    }

    /// Apply a snapshot write carrying the scan sequence that triggered
    /// it. Returns false when a more recent write already landed.
    fn apply_snapshot(&self, new_snapshot: EntitlementSnapshot, seq: u64) -> bool {
        let mut guard = self.snapshot.write().expect("entitlement lock poisoned");
        if seq < self.applied_seq.load(Ordering::SeqCst) {
            debug!(seq, "Stale entitlement update discarded");
            return false;
        }
        self.applied_seq.store(seq, Ordering::SeqCst);
        *guard = new_snapshot.clone();
        drop(guard);

        if let Err(e) = self.cache.put_json(ENTITLEMENT_KEY, &new_snapshot) {
            warn!(error = %e, "Entitlement cache write failed — snapshot kept in memory only");
        }
        true
    }
}
