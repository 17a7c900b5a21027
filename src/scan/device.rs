// SPDX-License-Identifier: GPL-3.0-only

//! Exclusive ownership of one camera stream
//!
//! A [`DeviceSession`] holds at most one stream. Acquisition and release are
//! serialized through a small slot state: a release that arrives while an
//! open is still in flight is remembered, and the stream is closed as soon
//! as the open resolves instead of being handed out.

use crate::backends::camera::{CameraFacing, CameraPlatform, StreamHandle};
use crate::errors::{ACQUIRE_CANCELLED, CameraError, PlatformErrorCode};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

enum Slot {
    Empty,
    Acquiring { release_requested: bool },
    Held(StreamHandle),
}

/// Owner of the single camera stream of a scan session
pub struct DeviceSession<P: CameraPlatform> {
    platform: Arc<P>,
    slot: Mutex<Slot>,
}

impl<P: CameraPlatform> DeviceSession<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            slot: Mutex::new(Slot::Empty),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a stream is currently held
    pub fn is_held(&self) -> bool {
        matches!(*self.slot(), Slot::Held(_))
    }

    /// Whether an open is in flight
    pub fn is_acquiring(&self) -> bool {
        matches!(*self.slot(), Slot::Acquiring { .. })
    }

    /// The held stream, if any
    pub fn stream(&self) -> Option<StreamHandle> {
        match &*self.slot() {
            Slot::Held(stream) => Some(stream.clone()),
            _ => None,
        }
    }

    /// Open a stream for `facing`
    ///
    /// Refuses with [`CameraError::DeviceBusy`], without touching hardware,
    /// while a stream is held or another open is in flight. If
    /// [`release`](Self::release) is called before the open resolves, the
    /// new stream is closed straight away and the call fails.
    pub async fn acquire(&self, facing: CameraFacing) -> Result<StreamHandle, CameraError> {
        {
            let mut slot = self.slot();
            if !matches!(*slot, Slot::Empty) {
                debug!(facing = %facing, "Camera already claimed by this session");
                return Err(CameraError::DeviceBusy);
            }
            *slot = Slot::Acquiring {
                release_requested: false,
            };
        }

        info!(facing = %facing, "Acquiring camera");
        let mut pending = PendingAcquire {
            session: self,
            armed: true,
        };
        let result = self.platform.open(facing).await;
        pending.disarm();

        let cancelled = {
            let mut slot = self.slot();
            let cancelled = matches!(
                *slot,
                Slot::Acquiring {
                    release_requested: true
                }
            );
            *slot = match &result {
                Ok(stream) if !cancelled => Slot::Held(stream.clone()),
                _ => Slot::Empty,
            };
            cancelled
        };

        match result {
            Ok(stream) if cancelled => {
                info!(stream = %stream.id(), "Released while acquiring, closing new stream");
                self.platform.close(stream).await;
                Err(CameraError::Unknown(ACQUIRE_CANCELLED.to_string()))
            }
            Ok(stream) => {
                info!(
                    stream = %stream.id(),
                    facing = %stream.facing(),
                    label = stream.label(),
                    "Camera acquired"
                );
                Ok(stream)
            }
            Err(err) => {
                let mapped = CameraError::from(err.clone());
                warn!(
                    facing = %facing,
                    code = %err.code,
                    error = %err.message,
                    mapped = ?mapped,
                    "Camera acquisition failed"
                );
                Err(mapped)
            }
        }
    }

    /// Switch the torch of the held stream
    ///
    /// Hardware without a torch reports [`CameraError::UnsupportedFeature`].
    pub async fn apply_torch(&self, on: bool) -> Result<(), CameraError> {
        let Some(stream) = self.stream() else {
            return Err(CameraError::Unknown("no active stream".to_string()));
        };

        match self.platform.set_torch(&stream, on).await {
            Ok(()) => {
                debug!(stream = %stream.id(), on, "Torch switched");
                Ok(())
            }
            Err(err) if err.code == PlatformErrorCode::NotSupported => {
                Err(CameraError::UnsupportedFeature)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Release the stream
    ///
    /// Idempotent. While an open is in flight this only marks it for
    /// release; the stream is closed when the open resolves.
    pub async fn release(&self) {
        let stream = {
            let mut slot = self.slot();
            match std::mem::replace(&mut *slot, Slot::Empty) {
                Slot::Empty => return,
                Slot::Acquiring { .. } => {
                    debug!("Release requested while acquiring");
                    *slot = Slot::Acquiring {
                        release_requested: true,
                    };
                    return;
                }
                Slot::Held(stream) => stream,
            }
        };

        info!(stream = %stream.id(), "Releasing camera");
        self.platform.close(stream).await;
    }

    /// Release only if `stream` is the one currently held
    ///
    /// Used by completions that may have been overtaken by a newer session.
    pub async fn release_stream(&self, stream: &StreamHandle) {
        let held = {
            let mut slot = self.slot();
            if !matches!(&*slot, Slot::Held(current) if current.id() == stream.id()) {
                return;
            }
            std::mem::replace(&mut *slot, Slot::Empty)
        };

        if let Slot::Held(stream) = held {
            info!(stream = %stream.id(), "Releasing stale camera stream");
            self.platform.close(stream).await;
        }
    }
}

impl<P: CameraPlatform> Drop for DeviceSession<P> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        let Slot::Held(stream) = std::mem::replace(slot, Slot::Empty) else {
            return;
        };

        warn!(stream = %stream.id(), "DeviceSession dropped with a live stream");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let platform = Arc::clone(&self.platform);
                runtime.spawn(async move { platform.close(stream).await });
            }
            Err(_) => warn!("No runtime to close stream on, relying on platform cleanup"),
        }
    }
}

/// Returns the slot to `Empty` if an acquire is dropped mid-open
struct PendingAcquire<'a, P: CameraPlatform> {
    session: &'a DeviceSession<P>,
    armed: bool,
}

impl<P: CameraPlatform> PendingAcquire<'_, P> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<P: CameraPlatform> Drop for PendingAcquire<'_, P> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = self.session.slot();
        if matches!(*slot, Slot::Acquiring { .. }) {
            *slot = Slot::Empty;
        }
    }
}
