// SPDX-License-Identifier: GPL-3.0-only

//! Camera view readiness signal
//!
//! The host resolves a [`SurfaceHandle`] once its view exists; the
//! controller waits on the paired [`SurfaceReady`] with a bound instead of
//! polling for the view.

use std::time::Duration;
use tokio::sync::watch;

/// Host side: marks the view as ready
#[derive(Debug, Clone)]
pub struct SurfaceHandle(watch::Sender<bool>);

/// Controller side: resolves once the view is ready
#[derive(Debug, Clone)]
pub struct SurfaceReady(watch::Receiver<bool>);

/// Create a readiness pair
pub fn surface_channel() -> (SurfaceHandle, SurfaceReady) {
    let (tx, rx) = watch::channel(false);
    (SurfaceHandle(tx), SurfaceReady(rx))
}

impl SurfaceHandle {
    /// Mark the view as ready. Later calls have no further effect.
    pub fn mark_ready(&self) {
        self.0.send_replace(true);
    }
}

impl SurfaceReady {
    /// A signal that is already resolved, for hosts without a view to wait on
    pub fn ready() -> Self {
        let (handle, ready) = surface_channel();
        handle.mark_ready();
        ready
    }

    /// Whether the view is ready right now
    pub fn is_ready(&self) -> bool {
        *self.0.borrow()
    }

    /// Wait up to `timeout` for the view
    ///
    /// Returns false on timeout, and also when the host dropped its handle
    /// without ever marking the view ready.
    pub async fn wait(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.0.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) | Err(_) => false,
        }
    }
}
