// SPDX-License-Identifier: GPL-3.0-only

//! Camera scan session
//!
//! [`ScanSessionController`] is the state machine the UI talks to. It owns a
//! [`DeviceSession`] (the single camera stream) and drives a
//! [`crate::decoder::DecodeEngine`] over it, handing results to the
//! [`Collaborators`].

pub mod collaborators;
pub mod controller;
pub mod device;
pub mod state;
pub mod surface;

pub use collaborators::{
    Collaborators, FeedbackNotifier, PreferenceSource, ResultSink, SystemUrlOpener, UrlOpener,
};
pub use controller::ScanSessionController;
pub use device::DeviceSession;
pub use state::{SessionSnapshot, SessionState};
pub use surface::{SurfaceHandle, SurfaceReady, surface_channel};
