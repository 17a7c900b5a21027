// SPDX-License-Identifier: GPL-3.0-only

//! Session state as seen by the UI layer

use crate::errors::CameraError;
use crate::payload::ClassifiedPayload;
use std::fmt;

/// Scan session state
///
/// The single authority on what the controller is doing; every guard in
/// the controller is a check against this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No scan view mounted
    #[default]
    Uninitialized,
    /// Waiting for the camera view to become ready
    Initializing,
    /// Nothing running; a new scan may be requested
    Idle,
    /// Opening the camera
    Acquiring,
    /// Stream live and decode loop running
    Scanning,
    /// Tearing down decode and stream
    Stopping,
    /// Session failed; only an explicit retry continues
    Error,
}

impl SessionState {
    /// Whether hardware may currently be claimed or in use
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Acquiring | SessionState::Scanning | SessionState::Stopping
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "UNINITIALIZED",
            SessionState::Initializing => "INITIALIZING",
            SessionState::Idle => "IDLE",
            SessionState::Acquiring => "ACQUIRING",
            SessionState::Scanning => "SCANNING",
            SessionState::Stopping => "STOPPING",
            SessionState::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Everything the UI renders from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Set while in [`SessionState::Error`], cleared on retry
    pub last_error: Option<CameraError>,
    /// Torch state of the current stream; false outside scanning
    pub torch_on: bool,
    /// Most recent successful scan
    pub last_result: Option<ClassifiedPayload>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.state, SessionState::Uninitialized);
        assert!(snapshot.last_error.is_none());
        assert!(!snapshot.torch_on);
    }

    #[test]
    fn test_active_states() {
        assert!(SessionState::Acquiring.is_active());
        assert!(SessionState::Scanning.is_active());
        assert!(!SessionState::Idle.is_active());
        assert!(!SessionState::Error.is_active());
        assert_eq!(SessionState::Scanning.to_string(), "SCANNING");
    }
}
