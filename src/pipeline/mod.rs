//! The scan pipeline: image preparation, the single classification
//! round-trip, and the synthetic progress signal that keeps the UI honest
//! while the backend thinks.
//!
//! One user-initiated attempt maps to exactly one network call. Every
//! failure is mapped to a typed [`ScanError`] with a user-facing message;
//! a backend-reported failure (confidence 0) is an `Ok` result the caller
//! must treat as a sentinel, never as a verdict.

pub mod backend;
pub mod orchestrator;
pub mod preprocess;
pub mod progress;
pub mod session;

pub use backend::{ClassificationClient, HttpClassificationClient, ScanPayload, ScanRequest};
pub use orchestrator::{ScanInput, ScanOrchestrator};
pub use preprocess::QualityTier;
pub use progress::ScanProgress;
pub use session::{ScanGuard, ScanSessionState};

use thiserror::Error;

/// Image preparation failures. Kept separate from [`ScanError`] so capture
/// and gallery-import paths can report them without a scan attempt.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("The image could not be decoded: {0}")]
    Decode(String),

    #[error("The image could not be re-encoded: {0}")]
    Encode(String),

    #[error("The image payload is not a valid data URI or base64 string: {0}")]
    Transfer(String),
}

/// Scan attempt failure taxonomy. Each variant carries a user-facing
/// message and maps to a distinct recovery path in the caller.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid scan input — {0}")]
    InvalidInput(String),

    #[error("Free scan limit reached — upgrade to continue scanning")]
    QuotaExceeded,

    #[error("The analysis took too long — please try again")]
    Timeout,

    #[error("No connection — check your network and try again")]
    NetworkUnreachable,

    #[error("The photos are too large to upload — the next attempt will use a smaller size")]
    PayloadTooLarge,

    #[error("The analysis service is temporarily unavailable — please try again shortly")]
    ServerUnavailable,

    #[error("The analysis service is not configured correctly")]
    Misconfigured,

    #[error("Something went wrong during analysis: {0}")]
    Unknown(String),
}

impl ScanError {
    /// Whether a plain user retry is a sensible remediation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::NetworkUnreachable | Self::ServerUnavailable
        )
    }
}
