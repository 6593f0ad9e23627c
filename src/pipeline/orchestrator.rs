//! The scan attempt driver.
//!
//! One `analyze` call is one attempt: preflight against the local
//! entitlement gate, prepare every image up front, make exactly one
//! network call, then settle progress and entitlements on the way out.
//! Partial submission is impossible — preparation either yields the full
//! payload or the attempt never reaches the network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::MAX_IMAGES_PER_SCAN;
use crate::entitlement::EntitlementState;
use crate::models::{IdentityToken, ImageAsset, ScanResult};

use super::backend::{ClassificationClient, ScanPayload, ScanRequest};
use super::preprocess::{self, QualityTier};
use super::progress::ScanProgress;
use super::ScanError;

const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// What the user handed us for this attempt. Exactly one modality.
#[derive(Debug, Clone)]
pub enum ScanInput {
    Images(Vec<ImageAsset>),
    Text(String),
}

pub struct ScanOrchestrator {
    client: Arc<dyn ClassificationClient>,
    entitlements: Arc<EntitlementState>,
    progress: Arc<ScanProgress>,
    /// Sticky downgrade: set when the backend rejects a payload as too
    /// large, so the *next* user-initiated attempt uploads smaller
    /// images. Never triggers an automatic resubmission.
    low_quality: AtomicBool,
}

impl ScanOrchestrator {
    pub fn new(client: Arc<dyn ClassificationClient>, entitlements: Arc<EntitlementState>) -> Self {
        Self {
            client,
            entitlements,
            progress: ScanProgress::new(),
            low_quality: AtomicBool::new(false),
        }
    }

    pub fn progress(&self) -> Arc<ScanProgress> {
        Arc::clone(&self.progress)
    }

    pub fn quality_tier(&self) -> QualityTier {
        if self.low_quality.load(Ordering::SeqCst) {
            QualityTier::Low
        } else {
            QualityTier::High
        }
    }

    /// Run one scan attempt end to end.
    ///
    /// A backend-reported failure (confidence 0) comes back as `Ok` and is
    /// deliberately left alone: no retry, no entitlement mutation. The
    /// caller decides what to show and must not persist it.
    pub fn analyze(
        &self,
        input: ScanInput,
        identity: Option<&IdentityToken>,
        language: &str,
    ) -> Result<ScanResult, ScanError> {
        // A fresh attempt starts from a clean bar — the previous attempt
        // may have left it clamped at 100.
        self.progress.reset();
        self.validate(&input)?;

        // Local gate first: a rejected attempt makes zero network calls.
        if !self.entitlements.can_scan() {
            info!("Scan rejected by local entitlement gate");
            return Err(ScanError::QuotaExceeded);
        }

        let _ticker = self.progress.start_ticker(TICK_INTERVAL);

        let payload = self.prepare(input);
        let request = ScanRequest {
            payload,
            language: language.to_string(),
            identity: identity.cloned(),
        };

        match self.client.classify(&request) {
            Ok(result) => {
                self.progress.complete();
                if result.is_reported_failure() {
                    info!("Backend reported an unusable input — no quota consumed");
                } else {
                    info!(verdict = result.verdict.as_str(), "Scan succeeded");
                    self.entitlements.after_successful_scan(identity);
                }
                Ok(result)
            }
            Err(error) => {
                self.progress.reset();
                if matches!(error, ScanError::PayloadTooLarge) {
                    self.low_quality.store(true, Ordering::SeqCst);
                    warn!("Payload rejected as too large — next attempt will use the low tier");
                }
                Err(error)
            }
        }
    }

    fn validate(&self, input: &ScanInput) -> Result<(), ScanError> {
        match input {
            ScanInput::Images(images) if images.is_empty() => Err(ScanError::InvalidInput(
                "at least one image is required".into(),
            )),
            ScanInput::Images(images) if images.len() > MAX_IMAGES_PER_SCAN => {
                Err(ScanError::InvalidInput(format!(
                    "at most {MAX_IMAGES_PER_SCAN} images per scan"
                )))
            }
            ScanInput::Text(text) if text.trim().is_empty() => Err(ScanError::InvalidInput(
                "the ingredient list is empty".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Normalize and downscale every image before anything is sent.
    fn prepare(&self, input: ScanInput) -> ScanPayload {
        match input {
            ScanInput::Images(images) => {
                let tier = self.quality_tier();
                let prepared = images
                    .iter()
                    .map(|asset| {
                        let upright = preprocess::normalize_orientation(asset);
                        preprocess::downscale_for_tier(&upright, tier)
                    })
                    .collect();
                ScanPayload::Images(prepared)
            }
            ScanInput::Text(text) => ScanPayload::Text(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FREE_SCAN_LIMIT;
    use crate::entitlement::{
        EntitlementError, EntitlementStore, IdentityProvider, RemoteEntitlement,
    };
    use crate::models::{EntitlementSnapshot, ScanVerdict};
    use crate::pipeline::backend::MockClassificationClient;
    use crate::storage::{MemoryStorage, ObfuscatedKv, StorageBackend};

    struct NoIdentity;

    impl IdentityProvider for NoIdentity {
        fn resolve(&self) -> Result<IdentityToken, EntitlementError> {
            Err(EntitlementError::IdentityUnavailable("offline".into()))
        }
    }

    struct UnreachableStore;

    impl EntitlementStore for UnreachableStore {
        fn fetch(&self, _: &IdentityToken) -> Result<RemoteEntitlement, EntitlementError> {
            Err(EntitlementError::Fetch("unreachable".into()))
        }

        fn increment(&self, _: &IdentityToken) -> Result<(), EntitlementError> {
            Err(EntitlementError::Fetch("unreachable".into()))
        }
    }

    fn entitlements_with_count(scan_count: u32) -> Arc<EntitlementState> {
        let storage = Arc::new(MemoryStorage::new());
        let kv = ObfuscatedKv::new(Arc::clone(&storage) as Arc<dyn StorageBackend>);
        kv.put_json(
            "entitlements",
            &EntitlementSnapshot {
                scan_count,
                is_premium: false,
                identity: None,
            },
        )
        .unwrap();
        Arc::new(EntitlementState::new(
            Arc::new(UnreachableStore),
            Arc::new(NoIdentity),
            storage,
        ))
    }

    fn success_result(confidence: u8) -> ScanResult {
        ScanResult {
            verdict: ScanVerdict::Halal,
            reason: "All listed ingredients are permissible".into(),
            confidence,
            ingredients: vec![],
        }
    }

    fn orchestrator(
        responses: Vec<Result<ScanResult, ScanError>>,
        scan_count: u32,
    ) -> (ScanOrchestrator, Arc<MockClassificationClient>) {
        let client = Arc::new(MockClassificationClient::new(responses));
        let orchestrator = ScanOrchestrator::new(
            Arc::clone(&client) as Arc<dyn ClassificationClient>,
            entitlements_with_count(scan_count),
        );
        (orchestrator, client)
    }

    fn text_input() -> ScanInput {
        ScanInput::Text("water, sugar, gelatin".into())
    }

    // ── input validation ──

    #[test]
    fn empty_inputs_are_rejected_without_a_network_call() {
        let (orch, client) = orchestrator(vec![], 0);
        assert!(matches!(
            orch.analyze(ScanInput::Images(vec![]), None, "en"),
            Err(ScanError::InvalidInput(_))
        ));
        assert!(matches!(
            orch.analyze(ScanInput::Text("   ".into()), None, "en"),
            Err(ScanError::InvalidInput(_))
        ));
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn image_count_is_capped() {
        let (orch, client) = orchestrator(vec![], 0);
        let png = tiny_png();
        let too_many = vec![png; MAX_IMAGES_PER_SCAN + 1];
        assert!(matches!(
            orch.analyze(ScanInput::Images(too_many), None, "en"),
            Err(ScanError::InvalidInput(_))
        ));
        assert_eq!(client.calls(), 0);
    }

    // ── quota preflight ──

    #[test]
    fn exhausted_quota_makes_zero_network_calls() {
        let (orch, client) = orchestrator(vec![Ok(success_result(90))], FREE_SCAN_LIMIT);
        assert!(matches!(
            orch.analyze(text_input(), None, "en"),
            Err(ScanError::QuotaExceeded)
        ));
        assert_eq!(client.calls(), 0);
        assert_eq!(orch.progress().value(), 0);
    }

    #[test]
    fn remote_limit_rejection_reads_like_the_local_one() {
        // Local snapshot says "go" but the authoritative backend says no.
        let (orch, client) = orchestrator(vec![Err(ScanError::QuotaExceeded)], 0);
        let err = orch.analyze(text_input(), None, "en").unwrap_err();
        assert!(matches!(err, ScanError::QuotaExceeded));
        assert_eq!(client.calls(), 1);
        assert_eq!(orch.progress().value(), 0, "progress resets on failure");
    }

    // ── outcomes ──

    #[test]
    fn success_completes_progress_and_counts_the_scan() {
        let (orch, client) = orchestrator(vec![Ok(success_result(92))], 3);
        let result = orch.analyze(text_input(), None, "en").unwrap();
        assert_eq!(result.confidence, 92);
        assert_eq!(client.calls(), 1);
        assert_eq!(orch.progress().value(), 100);
        // Offline path: local optimistic increment.
        assert_eq!(orch.entitlements.snapshot().scan_count, 4);
    }

    #[test]
    fn reported_failure_is_ok_but_consumes_nothing() {
        let (orch, client) = orchestrator(vec![Ok(success_result(0))], 3);
        let result = orch.analyze(text_input(), None, "en").unwrap();
        assert!(result.is_reported_failure());
        assert_eq!(client.calls(), 1, "no retry");
        assert_eq!(
            orch.entitlements.snapshot().scan_count,
            3,
            "sentinel must not consume quota"
        );
    }

    #[test]
    fn timeout_resets_progress_and_leaves_entitlements_alone() {
        let (orch, client) = orchestrator(vec![Err(ScanError::Timeout)], 5);
        assert!(matches!(
            orch.analyze(text_input(), None, "en"),
            Err(ScanError::Timeout)
        ));
        assert_eq!(client.calls(), 1);
        assert_eq!(orch.progress().value(), 0);
        assert_eq!(orch.entitlements.snapshot().scan_count, 5);
    }

    // ── progress across attempts ──

    /// Records the progress value visible while the request is in flight.
    struct ProgressSpyClient {
        inner: MockClassificationClient,
        progress: std::sync::Mutex<Option<Arc<ScanProgress>>>,
        observed: std::sync::Mutex<Vec<u32>>,
    }

    impl ClassificationClient for ProgressSpyClient {
        fn classify(&self, request: &ScanRequest) -> Result<ScanResult, ScanError> {
            if let Some(progress) = self.progress.lock().unwrap().as_ref() {
                self.observed.lock().unwrap().push(progress.value());
            }
            self.inner.classify(request)
        }
    }

    #[test]
    fn progress_never_reads_complete_while_a_request_is_in_flight() {
        let spy = Arc::new(ProgressSpyClient {
            inner: MockClassificationClient::new(vec![
                Ok(success_result(90)),
                Ok(success_result(91)),
            ]),
            progress: std::sync::Mutex::new(None),
            observed: std::sync::Mutex::new(Vec::new()),
        });
        let orch = ScanOrchestrator::new(
            Arc::clone(&spy) as Arc<dyn ClassificationClient>,
            entitlements_with_count(0),
        );
        *spy.progress.lock().unwrap() = Some(orch.progress());

        orch.analyze(text_input(), None, "en").unwrap();
        assert_eq!(orch.progress().value(), 100, "first attempt settles at 100");

        // The second attempt must not inherit the clamped bar.
        orch.analyze(text_input(), None, "en").unwrap();
        let observed = spy.observed.lock().unwrap();
        assert_eq!(observed.len(), 2);
        assert!(
            observed.iter().all(|&v| v < 100),
            "in-flight reads must stay below 100: {observed:?}"
        );
    }

    // ── payload-size downgrade ──

    #[test]
    fn payload_too_large_downgrades_the_next_attempt_without_resubmitting() {
        let (orch, client) = orchestrator(
            vec![Err(ScanError::PayloadTooLarge), Ok(success_result(88))],
            0,
        );
        assert_eq!(orch.quality_tier(), QualityTier::High);

        let err = orch
            .analyze(ScanInput::Images(vec![tiny_png()]), None, "en")
            .unwrap_err();
        assert!(matches!(err, ScanError::PayloadTooLarge));
        assert_eq!(client.calls(), 1, "never auto-resubmits");
        assert_eq!(orch.quality_tier(), QualityTier::Low);

        // The user tries again; the downgrade sticks.
        orch.analyze(ScanInput::Images(vec![tiny_png()]), None, "en")
            .unwrap();
        assert_eq!(client.calls(), 2);
        assert_eq!(orch.quality_tier(), QualityTier::Low);
    }

    fn tiny_png() -> ImageAsset {
        use image::{ImageBuffer, Rgba};
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(4, 4, Rgba([120, 130, 140, 255]));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        ImageAsset::from_bytes(bytes).unwrap()
    }
}
