// SPDX-License-Identifier: MPL-2.0

//! Error types for the scanner
//!
//! Camera failures are plain values ([`CameraError`]) that drive the scan
//! session into its error state. Nothing in here is meant to cross a
//! component boundary as a panic.

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for platform media calls
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Message carried by [`CameraError::Unknown`] when a still image holds no code
pub const NO_CODE_FOUND: &str = "no code found";

/// Message carried by [`CameraError::Unknown`] when the camera view never became ready
pub const SURFACE_NOT_READY: &str = "camera view not ready";

/// Message carried by [`CameraError::Unknown`] when a live stream ends mid-session
pub const STREAM_ENDED: &str = "camera stream ended";

/// Message returned to an acquisition that was released before it resolved
pub const ACQUIRE_CANCELLED: &str = "acquisition cancelled";

/// Message returned to a still image decode whose session was torn down meanwhile
pub const SCAN_CANCELLED: &str = "scan cancelled";

/// Top-level application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera-related errors
    Camera(CameraError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Camera session errors
///
/// Every variant is terminal for the session that produced it; only an
/// explicit retry starts a fresh one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// The user (or system policy) refused camera access
    PermissionDenied,
    /// No camera matches the request
    NoDevice,
    /// The camera is held by another process, or by this session already
    DeviceBusy,
    /// The hardware lacks the requested feature (torch)
    UnsupportedFeature,
    /// Anything else
    Unknown(String),
}

/// How the single retry action should be framed for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Access was refused; point at permission settings
    CheckPermissions,
    /// No camera found
    ConnectCamera,
    /// Another application holds the camera
    CloseOtherApps,
    /// The still image contained no readable code
    TryAnotherImage,
    /// Generic retry
    TryAgain,
}

impl CameraError {
    /// True for failures of the still-image path rather than the camera
    pub fn is_image_failure(&self) -> bool {
        matches!(self, CameraError::Unknown(msg) if msg == NO_CODE_FOUND)
    }

    /// Whether the error should ever reach the user
    ///
    /// Torch support is best effort, so an unsupported feature is swallowed
    /// by the caller.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, CameraError::UnsupportedFeature)
    }

    /// Retry framing for this error
    pub fn retry_hint(&self) -> RetryHint {
        match self {
            CameraError::PermissionDenied => RetryHint::CheckPermissions,
            CameraError::NoDevice => RetryHint::ConnectCamera,
            CameraError::DeviceBusy => RetryHint::CloseOtherApps,
            CameraError::Unknown(_) if self.is_image_failure() => RetryHint::TryAnotherImage,
            CameraError::UnsupportedFeature | CameraError::Unknown(_) => RetryHint::TryAgain,
        }
    }

    /// User-facing message, matching the wording of the scan screen
    pub fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied => {
                "Camera permission denied. Please allow access in settings.".to_string()
            }
            CameraError::NoDevice => "No camera found on this device.".to_string(),
            CameraError::DeviceBusy => {
                "Camera is busy or not readable. Please close other apps using it.".to_string()
            }
            CameraError::UnsupportedFeature => "This camera does not support that.".to_string(),
            CameraError::Unknown(_) if self.is_image_failure() => {
                "No QR code found in the selected image. Please try a clearer image.".to_string()
            }
            CameraError::Unknown(msg) => format!("Camera error: {}", msg),
        }
    }
}

/// Failure of a one-shot still image decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    /// The image decoded fine but contains no readable code
    NoCodeFound,
    /// The bytes are not an image we can read
    UnreadableImage(String),
}

/// Error codes reported by the platform media layer
///
/// These mirror the names camera APIs commonly use so backends can report
/// what happened without knowing how the session treats it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformErrorCode {
    /// Access refused
    NotAllowed,
    /// No device at all
    NotFound,
    /// Devices exist but none satisfies the request (e.g. facing mode)
    Overconstrained,
    /// Device exists but could not be read, usually because it is claimed
    NotReadable,
    /// Operation not supported by the device
    NotSupported,
    /// Anything else
    Other,
}

/// Error returned by a [`crate::backends::camera::CameraPlatform`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    /// Error classification
    pub code: PlatformErrorCode,
    /// Human readable detail
    pub message: String,
}

impl PlatformError {
    /// Create a platform error
    pub fn new(code: PlatformErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::PermissionDenied => write!(f, "Camera permission denied"),
            CameraError::NoDevice => write!(f, "No camera device found"),
            CameraError::DeviceBusy => write!(f, "Camera is busy"),
            CameraError::UnsupportedFeature => write!(f, "Feature not supported by camera"),
            CameraError::Unknown(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeFailure::NoCodeFound => write!(f, "No code found in image"),
            DecodeFailure::UnreadableImage(msg) => write!(f, "Unreadable image: {}", msg),
        }
    }
}

impl fmt::Display for PlatformErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlatformErrorCode::NotAllowed => "NotAllowed",
            PlatformErrorCode::NotFound => "NotFound",
            PlatformErrorCode::Overconstrained => "Overconstrained",
            PlatformErrorCode::NotReadable => "NotReadable",
            PlatformErrorCode::NotSupported => "NotSupported",
            PlatformErrorCode::Other => "Other",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CameraError {}
impl std::error::Error for DecodeFailure {}
impl std::error::Error for PlatformError {}

impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<PlatformError> for CameraError {
    fn from(err: PlatformError) -> Self {
        match err.code {
            PlatformErrorCode::NotAllowed => CameraError::PermissionDenied,
            PlatformErrorCode::NotFound | PlatformErrorCode::Overconstrained => {
                CameraError::NoDevice
            }
            PlatformErrorCode::NotReadable => CameraError::DeviceBusy,
            // Some drivers only say so in the message
            PlatformErrorCode::Other if err.message.contains("video source") => {
                CameraError::DeviceBusy
            }
            // Torch control maps NotSupported itself; anywhere else it is a
            // hard failure the user has to see
            PlatformErrorCode::NotSupported | PlatformErrorCode::Other => {
                CameraError::Unknown(err.message)
            }
        }
    }
}

impl From<std::io::Error> for PlatformError {
    fn from(err: std::io::Error) -> Self {
        let code = match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) => PlatformErrorCode::NotAllowed,
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
                PlatformErrorCode::NotFound
            }
            Some(libc::EBUSY) => PlatformErrorCode::NotReadable,
            Some(libc::ENOTTY) => PlatformErrorCode::NotSupported,
            _ => match err.kind() {
                std::io::ErrorKind::PermissionDenied => PlatformErrorCode::NotAllowed,
                std::io::ErrorKind::NotFound => PlatformErrorCode::NotFound,
                std::io::ErrorKind::Unsupported => PlatformErrorCode::NotSupported,
                _ => PlatformErrorCode::Other,
            },
        };
        PlatformError::new(code, err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_codes_map_to_camera_errors() {
        let map = |code| CameraError::from(PlatformError::new(code, "x"));
        assert_eq!(map(PlatformErrorCode::NotAllowed), CameraError::PermissionDenied);
        assert_eq!(map(PlatformErrorCode::NotFound), CameraError::NoDevice);
        assert_eq!(map(PlatformErrorCode::Overconstrained), CameraError::NoDevice);
        assert_eq!(map(PlatformErrorCode::NotReadable), CameraError::DeviceBusy);
        assert_eq!(
            map(PlatformErrorCode::NotSupported),
            CameraError::Unknown("x".to_string())
        );
        assert_eq!(
            map(PlatformErrorCode::Other),
            CameraError::Unknown("x".to_string())
        );
    }

    #[test]
    fn test_video_source_message_is_busy() {
        let err = PlatformError::new(PlatformErrorCode::Other, "Could not start video source");
        assert_eq!(CameraError::from(err), CameraError::DeviceBusy);
    }

    #[test]
    fn test_errno_mapping() {
        let code = |errno| PlatformError::from(std::io::Error::from_raw_os_error(errno)).code;
        assert_eq!(code(libc::EACCES), PlatformErrorCode::NotAllowed);
        assert_eq!(code(libc::ENOENT), PlatformErrorCode::NotFound);
        assert_eq!(code(libc::ENODEV), PlatformErrorCode::NotFound);
        assert_eq!(code(libc::EBUSY), PlatformErrorCode::NotReadable);
        assert_eq!(code(libc::EIO), PlatformErrorCode::Other);
    }

    #[test]
    fn test_retry_hints_separate_image_from_camera() {
        let image = CameraError::Unknown(NO_CODE_FOUND.to_string());
        assert!(image.is_image_failure());
        assert_eq!(image.retry_hint(), RetryHint::TryAnotherImage);
        assert_eq!(
            CameraError::PermissionDenied.retry_hint(),
            RetryHint::CheckPermissions
        );
        assert_eq!(
            CameraError::Unknown(STREAM_ENDED.to_string()).retry_hint(),
            RetryHint::TryAgain
        );
    }
}
