//! Classification backend client.
//!
//! One trait seam, one HTTP implementation, one mock. The HTTP client
//! speaks the remote scan endpoint's wire contract: multipart for binary
//! image payloads, JSON for ingredient text, bearer identity token, and
//! a small error-code vocabulary in failure bodies.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{IdentityToken, PreparedImage, ScanResult};

use super::ScanError;

/// One classification request: exactly one modality.
#[derive(Debug, Clone)]
pub enum ScanPayload {
    Images(Vec<PreparedImage>),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub payload: ScanPayload,
    /// BCP 47 tag forwarded so the verdict reason comes back localized.
    pub language: String,
    pub identity: Option<IdentityToken>,
}

/// The single seam the orchestrator talks through.
pub trait ClassificationClient: Send + Sync {
    fn classify(&self, request: &ScanRequest) -> Result<ScanResult, ScanError>;
}

/// Error body shape returned by the scan endpoint on non-2xx.
#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Map a non-2xx response to the scan error taxonomy. Pure so the whole
/// table is testable without a server.
pub fn classify_http_failure(status: u16, body: &str) -> ScanError {
    let wire: Option<WireError> = serde_json::from_str(body).ok();
    let code = wire.as_ref().map(|w| w.code.as_str()).unwrap_or_default();

    match (status, code) {
        (_, "LIMIT_REACHED") | (403, _) => ScanError::QuotaExceeded,
        (_, "CONFIGURATION_ERROR") => ScanError::Misconfigured,
        (504, _) => ScanError::Timeout,
        (413, _) => ScanError::PayloadTooLarge,
        (s, _) if (500..600).contains(&s) => ScanError::ServerUnavailable,
        _ => {
            let message = wire
                .map(|w| w.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("HTTP {status}"));
            ScanError::Unknown(message)
        }
    }
}

/// Map a transport-level failure (no HTTP response at all).
pub fn classify_transport_failure(error: &reqwest::Error) -> ScanError {
    if error.is_timeout() {
        ScanError::Timeout
    } else if error.is_connect() {
        ScanError::NetworkUnreachable
    } else {
        ScanError::Unknown(error.to_string())
    }
}

/// HTTP classification client.
pub struct HttpClassificationClient {
    base_url: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpClassificationClient {
    /// `base_url = None` models a missing deployment configuration; every
    /// classify call then fails `Misconfigured` without touching the
    /// network.
    pub fn new(base_url: Option<&str>, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            client,
        }
    }

    fn endpoint(&self) -> Result<String, ScanError> {
        let base = self.base_url.as_deref().ok_or(ScanError::Misconfigured)?;
        Ok(format!("{base}/v1/scan"))
    }
}

impl ClassificationClient for HttpClassificationClient {
    fn classify(&self, request: &ScanRequest) -> Result<ScanResult, ScanError> {
        let url = self.endpoint()?;

        let mut builder = self.client.post(&url);
        if let Some(identity) = &request.identity {
            builder = builder.bearer_auth(identity.as_str());
        }

        let response = match &request.payload {
            ScanPayload::Images(images) => {
                let mut form = reqwest::blocking::multipart::Form::new()
                    .text("language", request.language.clone());
                for (index, image) in images.iter().enumerate() {
                    let part = reqwest::blocking::multipart::Part::bytes(image.bytes.clone())
                        .file_name(format!("image-{index}"))
                        .mime_str(&image.mime)
                        .map_err(|e| ScanError::Unknown(e.to_string()))?;
                    form = form.part("images", part);
                }
                debug!(images = images.len(), "Submitting image scan request");
                builder.multipart(form).send()
            }
            ScanPayload::Text(text) => {
                debug!(chars = text.len(), "Submitting ingredient-text scan request");
                builder
                    .json(&serde_json::json!({
                        "ingredientsText": text,
                        "language": request.language,
                    }))
                    .send()
            }
        }
        .map_err(|e| classify_transport_failure(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "Scan request rejected");
            return Err(classify_http_failure(status.as_u16(), &body));
        }

        response
            .json::<ScanResult>()
            .map_err(|e| ScanError::Unknown(format!("Malformed scan response: {e}")))
    }
}

/// In-memory classification backend for tests and offline demos. Counts
/// calls so quota-preflight behavior is observable.
pub struct MockClassificationClient {
    responses: Mutex<Vec<Result<ScanResult, ScanError>>>,
    calls: AtomicU32,
}

impl MockClassificationClient {
    pub fn new(responses: Vec<Result<ScanResult, ScanError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClassificationClient for MockClassificationClient {
    fn classify(&self, _request: &ScanRequest) -> Result<ScanResult, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ScanError::Unknown("mock exhausted".into()));
        }
        responses.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── failure mapping table ──

    #[test]
    fn limit_reached_body_maps_to_quota_exceeded() {
        let err = classify_http_failure(403, r#"{"code":"LIMIT_REACHED","message":"limit"}"#);
        assert!(matches!(err, ScanError::QuotaExceeded));
    }

    #[test]
    fn bare_forbidden_maps_to_quota_exceeded() {
        assert!(matches!(
            classify_http_failure(403, ""),
            ScanError::QuotaExceeded
        ));
    }

    #[test]
    fn configuration_error_code_wins_over_status() {
        let err = classify_http_failure(500, r#"{"code":"CONFIGURATION_ERROR","message":"no key"}"#);
        assert!(matches!(err, ScanError::Misconfigured));
    }

    #[test]
    fn gateway_timeout_maps_to_timeout() {
        assert!(matches!(classify_http_failure(504, ""), ScanError::Timeout));
    }

    #[test]
    fn oversized_payload_maps_to_payload_too_large() {
        assert!(matches!(
            classify_http_failure(413, ""),
            ScanError::PayloadTooLarge
        ));
    }

    #[test]
    fn other_server_errors_map_to_server_unavailable() {
        for status in [500, 502, 503, 599] {
            assert!(matches!(
                classify_http_failure(status, "{}"),
                ScanError::ServerUnavailable
            ));
        }
    }

    #[test]
    fn unrecognized_failures_carry_the_body_message() {
        let err = classify_http_failure(418, r#"{"code":"TEAPOT","message":"short and stout"}"#);
        match err {
            ScanError::Unknown(msg) => assert_eq!(msg, "short and stout"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn non_json_body_falls_back_to_the_status_line() {
        let err = classify_http_failure(400, "<html>nope</html>");
        match err {
            ScanError::Unknown(msg) => assert!(msg.contains("400")),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    // ── configuration ──

    #[test]
    fn missing_base_url_fails_misconfigured_without_network() {
        let client = HttpClassificationClient::new(None, 5);
        let request = ScanRequest {
            payload: ScanPayload::Text("water, sugar".into()),
            language: "en".into(),
            identity: None,
        };
        assert!(matches!(
            client.classify(&request),
            Err(ScanError::Misconfigured)
        ));
    }

    // ── mock ──

    #[test]
    fn mock_counts_calls_and_replays_in_order() {
        let mock = MockClassificationClient::new(vec![
            Err(ScanError::Timeout),
            Err(ScanError::ServerUnavailable),
        ]);
        let request = ScanRequest {
            payload: ScanPayload::Text("salt".into()),
            language: "en".into(),
            identity: None,
        };
        assert!(matches!(mock.classify(&request), Err(ScanError::Timeout)));
        assert!(matches!(
            mock.classify(&request),
            Err(ScanError::ServerUnavailable)
        ));
        assert_eq!(mock.calls(), 2);
    }
}
