//! Camera stream acquisition with graceful degradation.
//!
//! A [`CaptureSession`] owns one live camera stream behind the
//! [`CameraBackend`] / [`CameraStream`] trait seams, so the same state
//! machine runs against a real host camera surface or a mock. On hosts
//! with no usable live-camera API the session degrades to the host-native
//! capture UI instead of failing the scan flow.

pub mod session;

pub use session::{CancellationHandle, CaptureSession, SessionState};

use thiserror::Error;

use crate::models::ImageAsset;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera permission was denied — grant camera access in system settings to scan live")]
    PermissionDenied,

    #[error("No usable camera device was found — use the photo picker instead")]
    DeviceUnavailable,

    #[error("This host has no live camera support — use the photo picker instead")]
    NoCameraApi,

    #[error("A capture is already in progress")]
    CaptureInFlight,

    #[error("The capture session is closed")]
    SessionClosed,

    #[error("The {control} control is not available on this device")]
    ConstraintUnsupported { control: &'static str },

    #[error("Reading the camera frame failed: {0}")]
    Frame(String),
}

/// User-facing remediation for a capture failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Ask the operator to grant camera permission.
    GrantPermission,
    /// Offer the host-native picker path.
    UseFallback,
    /// The host cannot do live capture at all.
    UnsupportedHost,
    /// Transient — offer a plain retry.
    Retry,
}

impl CaptureError {
    /// Map each failure to its distinct remediation path.
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::PermissionDenied => Remediation::GrantPermission,
            Self::DeviceUnavailable | Self::ConstraintUnsupported { .. } => Remediation::UseFallback,
            Self::NoCameraApi => Remediation::UnsupportedHost,
            Self::CaptureInFlight | Self::SessionClosed | Self::Frame(_) => Remediation::Retry,
        }
    }
}

/// Torch and zoom capability flags probed once at stream-open time.
///
/// Scoped to the lifetime of one session and destroyed with it. These
/// flags are the single source of truth for whether the UI offers the
/// controls at all — call sites never re-probe the device.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureCapabilities {
    pub torch_available: bool,
    pub torch_on: bool,
    pub zoom_available: bool,
    pub zoom_level: f32,
    pub zoom_max: f32,
}

impl Default for CaptureCapabilities {
    fn default() -> Self {
        Self {
            torch_available: false,
            torch_on: false,
            zoom_available: false,
            zoom_level: 1.0,
            zoom_max: 1.0,
        }
    }
}

/// How a capture resolves the session afterwards.
///
/// A short press maps to `CaptureAndClose`; a long press (held ~800 ms)
/// maps to `CaptureAndHold`, which keeps the stream open for another
/// capture and emits [`CaptureEvent::ImageAdded`] as transient feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    CaptureAndClose,
    CaptureAndHold,
}

/// Transient UI feedback emitted by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A `CaptureAndHold` frame was added; the session remains open.
    ImageAdded,
}

/// Which camera and resolution to ask the host for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub rear_facing: bool,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl StreamConstraints {
    /// First attempt: rear camera at a bounded ideal resolution.
    pub fn ideal_rear() -> Self {
        Self {
            rear_facing: true,
            ideal_width: Some(1280),
            ideal_height: Some(720),
        }
    }

    /// Retry attempt: any video stream the host can give us.
    pub fn generic() -> Self {
        Self {
            rear_facing: false,
            ideal_width: None,
            ideal_height: None,
        }
    }
}

/// Host camera surface. One implementation per host environment.
pub trait CameraBackend: Send + Sync {
    /// Whether a live media API exists at all on this host.
    fn has_live_api(&self) -> bool;

    /// Whether we run inside a native wrapper that gates camera access
    /// behind an explicit permission prompt.
    fn is_native_wrapped(&self) -> bool;

    /// Request camera permission from the operator.
    fn request_permission(&self) -> Result<(), CaptureError>;

    /// Open a live video stream matching the constraints.
    fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn CameraStream>, CaptureError>;

    /// Invoke the host-native photo picker / camera UI.
    /// `Ok(None)` means the operator cancelled — not an error.
    fn native_capture(&self) -> Result<Option<ImageAsset>, CaptureError>;
}

/// One live video stream.
pub trait CameraStream: Send {
    /// Read the current visual frame as a full-native-resolution JPEG
    /// (encoded at high quality, ~0.95).
    fn read_frame(&mut self) -> Result<ImageAsset, CaptureError>;

    /// Probe torch/zoom support. Absence of a capability is reported,
    /// never an error.
    fn capabilities(&self) -> CaptureCapabilities;

    fn set_zoom(&mut self, level: f32) -> Result<(), CaptureError>;

    fn set_torch(&mut self, on: bool) -> Result<(), CaptureError>;

    /// Stop all underlying media tracks. Must be idempotent.
    fn stop(&mut self);
}
