// SPDX-License-Identifier: GPL-3.0-only

//! Code recognition
//!
//! A [`DecodeEngine`] watches a live stream and reports recognised codes
//! through [`DecodeCallbacks`], or decodes a single still image on request.
//! The scan session never looks at pixels itself.

pub mod qr_detector;

pub use qr_detector::QrDecodeEngine;

use crate::backends::camera::StreamHandle;
use crate::errors::{CameraError, DecodeFailure};
use async_trait::async_trait;
use std::sync::Arc;

type TextCallback = Arc<dyn Fn(String) + Send + Sync>;
type SignalCallback = Arc<dyn Fn() + Send + Sync>;

/// Callbacks invoked by a running continuous decode
///
/// Invocations may arrive from any task, in any number, and even after the
/// session that registered them is gone. Receivers must guard themselves.
#[derive(Clone)]
pub struct DecodeCallbacks {
    on_match: TextCallback,
    on_frame_miss: SignalCallback,
    on_stream_lost: SignalCallback,
}

impl DecodeCallbacks {
    pub fn new(
        on_match: impl Fn(String) + Send + Sync + 'static,
        on_frame_miss: impl Fn() + Send + Sync + 'static,
        on_stream_lost: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_match: Arc::new(on_match),
            on_frame_miss: Arc::new(on_frame_miss),
            on_stream_lost: Arc::new(on_stream_lost),
        }
    }

    /// A frame contained a code with this text
    pub fn matched(&self, text: String) {
        (self.on_match)(text)
    }

    /// A frame was analysed without result
    pub fn missed(&self) {
        (self.on_frame_miss)()
    }

    /// The stream stopped producing frames for good
    pub fn stream_lost(&self) {
        (self.on_stream_lost)()
    }
}

impl std::fmt::Debug for DecodeCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeCallbacks").finish_non_exhaustive()
    }
}

/// Frame-level code recognition
#[async_trait]
pub trait DecodeEngine: Send + Sync + 'static {
    /// Begin analysing frames of `stream`
    ///
    /// Replaces any decode already running. Must be called from within a
    /// tokio runtime.
    fn start_continuous_decode(
        &self,
        stream: &StreamHandle,
        callbacks: DecodeCallbacks,
    ) -> Result<(), CameraError>;

    /// Stop analysing frames. Safe to call when nothing is running.
    fn stop_continuous_decode(&self);

    /// Decode a single encoded image (PNG, JPEG, ...)
    async fn decode_still_image(&self, image: &[u8]) -> Result<String, DecodeFailure>;
}
