//! The capture session state machine.
//!
//! `Uninitialized → RequestingPermission → StreamActive →
//! {Capturing → StreamActive}* → Closed`, with `Degraded` whenever a live
//! stream cannot be opened (permission denied, no media API, device
//! failure). In `Degraded` only the host-native capture UI is offered,
//! through the same capture contract as a live frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::models::ImageAsset;

use super::{
    CameraBackend, CameraStream, CaptureCapabilities, CaptureError, CaptureEvent, CaptureMode,
    StreamConstraints,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    RequestingPermission,
    StreamActive,
    Capturing,
    /// No live stream — only `fallback_capture` is offered.
    Degraded,
    Closed,
}

/// Owner-side teardown signal for a session whose `open()` may still be
/// resolving on another task.
///
/// A session that acquires its stream after the owner is already gone
/// must release that stream immediately and never present it — this is
/// the one mandatory cancellation check in the pipeline.
#[derive(Clone)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct CaptureSession {
    backend: Arc<dyn CameraBackend>,
    state: SessionState,
    stream: Option<Box<dyn CameraStream>>,
    capabilities: CaptureCapabilities,
    cancelled: Arc<AtomicBool>,
    events: Option<Sender<CaptureEvent>>,
    capture_in_flight: bool,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            backend,
            state: SessionState::Uninitialized,
            stream: None,
            capabilities: CaptureCapabilities::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
            events: None,
            capture_in_flight: false,
        }
    }

    /// Register a channel for transient UI feedback events.
    pub fn with_events(mut self, events: Sender<CaptureEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Capability flags probed at stream-open time — the single source of
    /// truth for offering torch/zoom controls.
    pub fn capabilities(&self) -> &CaptureCapabilities {
        &self.capabilities
    }

    /// Handle the owner keeps to signal teardown while `open()` resolves.
    pub fn cancellation_handle(&self) -> CancellationHandle {
        CancellationHandle(Arc::clone(&self.cancelled))
    }

    /// Acquire the live stream: permission negotiation (native-wrapped
    /// hosts only), rear camera at a bounded ideal resolution, one retry
    /// with generic constraints, then `Degraded`.
    pub fn open(&mut self) -> Result<(), CaptureError> {
        if self.state == SessionState::Closed {
            return Err(CaptureError::SessionClosed);
        }
        self.state = SessionState::RequestingPermission;

        if self.backend.is_native_wrapped() {
            if let Err(e) = self.backend.request_permission() {
                warn!(error = %e, "Camera permission denied — degrading to native capture");
                self.state = SessionState::Degraded;
                return Err(CaptureError::PermissionDenied);
            }
        }

        if !self.backend.has_live_api() {
            info!("Host exposes no live camera API — degrading to native capture");
            self.state = SessionState::Degraded;
            return Err(CaptureError::NoCameraApi);
        }

        let stream = match self.backend.open_stream(&StreamConstraints::ideal_rear()) {
            Ok(s) => s,
            Err(first) => {
                debug!(error = %first, "Ideal constraints rejected — retrying with generic video");
                match self.backend.open_stream(&StreamConstraints::generic()) {
                    Ok(s) => s,
                    Err(second) => {
                        warn!(error = %second, "Camera stream unavailable — degrading");
                        self.state = SessionState::Degraded;
                        return Err(CaptureError::DeviceUnavailable);
                    }
                }
            }
        };

        // The owner may have torn down while the stream was resolving.
        // Release immediately; the stream must never be presented.
        if self.cancelled.load(Ordering::SeqCst) {
            let mut stream = stream;
            stream.stop();
            self.state = SessionState::Closed;
            return Err(CaptureError::SessionClosed);
        }

        self.capabilities = stream.capabilities();
        self.stream = Some(stream);
        self.state = SessionState::StreamActive;
        info!(
            torch = self.capabilities.torch_available,
            zoom = self.capabilities.zoom_available,
            zoom_max = self.capabilities.zoom_max,
            "Capture session active"
        );
        Ok(())
    }

    /// Idempotent teardown: stops all tracks, releases the stream, and
    /// marks any still-resolving `open()` as cancelled.
    pub fn close(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.capabilities = CaptureCapabilities::default();
        self.state = SessionState::Closed;
    }

    /// Read the current frame into a new [`ImageAsset`].
    ///
    /// At most one capture may be in flight per session. In `Degraded`
    /// this never errors — it redirects to [`Self::fallback_capture`].
    pub fn capture(&mut self, mode: CaptureMode) -> Result<Option<ImageAsset>, CaptureError> {
        if self.capture_in_flight {
            return Err(CaptureError::CaptureInFlight);
        }
        if self.state == SessionState::Degraded {
            return self.fallback_capture();
        }
        if self.stream.is_none() {
            return Err(CaptureError::SessionClosed);
        }

        self.capture_in_flight = true;
        self.state = SessionState::Capturing;
        let frame = self
            .stream
            .as_mut()
            .expect("stream presence checked above")
            .read_frame();
        self.capture_in_flight = false;

        let asset = match frame {
            Ok(asset) => asset,
            Err(e) => {
                self.state = SessionState::StreamActive;
                return Err(e);
            }
        };

        match mode {
            CaptureMode::CaptureAndHold => {
                self.state = SessionState::StreamActive;
                if let Some(events) = &self.events {
                    let _ = events.send(CaptureEvent::ImageAdded);
                }
            }
            CaptureMode::CaptureAndClose => self.close(),
        }

        debug!(
            ?mode,
            width = asset.width,
            height = asset.height,
            bytes = asset.bytes.len(),
            "Frame captured"
        );
        Ok(Some(asset))
    }

    /// Delegate to the host-native photo picker / camera UI.
    ///
    /// Available in `Degraded` and as a user-invoked escape hatch at any
    /// time. `Ok(None)` means the operator cancelled.
    pub fn fallback_capture(&mut self) -> Result<Option<ImageAsset>, CaptureError> {
        match self.backend.native_capture()? {
            Some(asset) => {
                debug!(width = asset.width, height = asset.height, "Native capture delivered");
                Ok(Some(asset))
            }
            None => {
                debug!("Native capture cancelled by operator");
                Ok(None)
            }
        }
    }

    /// Apply a zoom level, clamped to the probed range.
    ///
    /// A recoverable no-op failure when zoom is absent or the constraint
    /// application throws — never fatal to the session.
    pub fn set_zoom(&mut self, level: f32) -> Result<(), CaptureError> {
        if !self.capabilities.zoom_available {
            return Err(CaptureError::ConstraintUnsupported { control: "zoom" });
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or(CaptureError::SessionClosed)?;
        let clamped = level.clamp(1.0, self.capabilities.zoom_max);
        match stream.set_zoom(clamped) {
            Ok(()) => {
                self.capabilities.zoom_level = clamped;
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "Zoom constraint rejected by device");
                Err(CaptureError::ConstraintUnsupported { control: "zoom" })
            }
        }
    }

    /// Toggle the torch. Same recoverable-failure contract as zoom.
    pub fn toggle_torch(&mut self) -> Result<bool, CaptureError> {
        if !self.capabilities.torch_available {
            return Err(CaptureError::ConstraintUnsupported { control: "torch" });
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or(CaptureError::SessionClosed)?;
        let target = !self.capabilities.torch_on;
        match stream.set_torch(target) {
            Ok(()) => {
                self.capabilities.torch_on = target;
                Ok(target)
            }
            Err(e) => {
                debug!(error = %e, "Torch constraint rejected by device");
                Err(CaptureError::ConstraintUnsupported { control: "torch" })
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}
