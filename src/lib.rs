// SPDX-License-Identifier: MPL-2.0

//! vioscan - QR code scanning with a camera session state machine
//!
//! The interesting part of a scanner is not the decoding but the camera
//! lifecycle around it: one exclusive device, permission failures, a
//! fallback camera, and a decode loop that must stop the moment a code is
//! recognised or the view goes away. This crate models that lifecycle as an
//! explicit state machine.
//!
//! # Architecture
//!
//! - [`scan`]: [`scan::ScanSessionController`] and the [`scan::DeviceSession`] it owns
//! - [`backends`]: the camera platform seam and its V4L2 implementation
//! - [`decoder`]: frame and still-image decoding
//! - [`payload`]: classification of decoded text
//! - [`history`], [`feedback`]: result sink and success cue used by the CLI
//! - [`config`]: user preferences and scan tuning
//!
//! # Example
//!
//! ```ignore
//! let controller = ScanSessionController::new(platform, engine, collaborators, config.scan);
//! let (surface, ready) = surface_channel();
//! controller.mount(ready);
//! surface.mark_ready();
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod errors;
pub mod feedback;
pub mod flash;
pub mod history;
pub mod payload;
pub mod scan;

// Re-export commonly used types
pub use config::{Config, Preferences, ScanConfig};
pub use errors::{CameraError, RetryHint};
pub use payload::{ClassifiedPayload, PayloadKind, classify};
pub use scan::{ScanSessionController, SessionSnapshot, SessionState};
