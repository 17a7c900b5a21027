// SPDX-License-Identifier: GPL-3.0-only

//! Scan session state machine
//!
//! Sequences the [`DeviceSession`] and the [`DecodeEngine`] across mount,
//! acquisition, decoding, stop, error and retry.
//!
//! ```text
//! UNINITIALIZED ──mount──▶ INITIALIZING ──surface ready──▶ ACQUIRING ──▶ SCANNING
//!                               ▲                              │            │
//!                     retry /   │                              ▼            ▼
//!                  request_scan │                            ERROR ◀─── STOPPING ──▶ IDLE
//! ```
//!
//! # Generations
//!
//! Every session start and every teardown bumps a generation counter.
//! Asynchronous work (surface wait, acquisition, teardown, decode callbacks)
//! remembers the generation it was started for and only mutates state if it
//! is still current, so a late completion can never resurrect a session that
//! has been stopped or unmounted.
//!
//! Controller state sits behind a plain mutex that is never held across an
//! `.await`. Decode engine start and stop happen under that mutex, which is
//! what makes the flip out of SCANNING on the first match atomic with respect
//! to further decode callbacks.

use super::collaborators::Collaborators;
use super::device::DeviceSession;
use super::state::{SessionSnapshot, SessionState};
use super::surface::SurfaceReady;
use crate::backends::camera::{CameraFacing, CameraPlatform, StreamHandle};
use crate::config::ScanConfig;
use crate::decoder::{DecodeCallbacks, DecodeEngine};
use crate::errors::{
    ACQUIRE_CANCELLED, CameraError, NO_CODE_FOUND, SCAN_CANCELLED, STREAM_ENDED, SURFACE_NOT_READY,
};
use crate::payload::{ClassifiedPayload, PayloadKind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Mutable controller state
struct Core {
    snapshot: SessionSnapshot,
    generation: u64,
    /// Readiness of the host's camera view, set on mount
    surface: Option<SurfaceReady>,
    /// Session and teardown tasks not yet joined
    tasks: Vec<JoinHandle<()>>,
    /// Bumped by every torch toggle; only the latest one may roll back
    torch_request: u64,
    /// Torch state the hardware last accepted
    torch_confirmed: bool,
}

struct Inner<P: CameraPlatform, E: DecodeEngine> {
    device: DeviceSession<P>,
    engine: E,
    collaborators: Collaborators,
    config: ScanConfig,
    core: Mutex<Core>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    generation_tx: watch::Sender<u64>,
}

/// Camera scan session controller
///
/// Cheap to clone; clones share the same session. Methods that start work
/// in the background must be called from within a tokio runtime.
pub struct ScanSessionController<P: CameraPlatform, E: DecodeEngine> {
    inner: Arc<Inner<P, E>>,
}

impl<P: CameraPlatform, E: DecodeEngine> Clone for ScanSessionController<P, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: CameraPlatform, E: DecodeEngine> ScanSessionController<P, E> {
    pub fn new(platform: Arc<P>, engine: E, collaborators: Collaborators, config: ScanConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        let (generation_tx, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                device: DeviceSession::new(platform),
                engine,
                collaborators,
                config,
                core: Mutex::new(Core {
                    snapshot: SessionSnapshot::default(),
                    generation: 0,
                    surface: None,
                    tasks: Vec::new(),
                    torch_request: 0,
                    torch_confirmed: false,
                }),
                snapshot_tx,
                generation_tx,
            }),
        }
    }

    /// Current state, error, torch and last result
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().snapshot.clone()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.inner.lock().snapshot.state
    }

    /// Observe every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Scan view mounted: start a session once `surface` is ready
    ///
    /// Ignored unless the controller is unmounted.
    pub fn mount(&self, surface: SurfaceReady) {
        let mut core = self.inner.lock();
        if core.snapshot.state != SessionState::Uninitialized {
            debug!(state = %core.snapshot.state, "Already mounted, ignoring mount");
            return;
        }
        info!("Scan view mounted");
        core.surface = Some(surface);
        self.inner.start_session(&mut core);
    }

    /// Start a new scan after a completed one
    ///
    /// Only valid in IDLE. Requests in any other state are ignored, which
    /// makes repeated requests during acquisition or scanning harmless.
    pub fn request_scan(&self) {
        let mut core = self.inner.lock();
        if core.snapshot.state != SessionState::Idle {
            debug!(state = %core.snapshot.state, "Scan request ignored");
            return;
        }
        self.inner.start_session(&mut core);
    }

    /// Leave ERROR with a fresh session
    pub fn retry(&self) {
        let mut core = self.inner.lock();
        if core.snapshot.state != SessionState::Error {
            debug!(state = %core.snapshot.state, "Retry ignored outside error state");
            return;
        }
        info!(error = ?core.snapshot.last_error, "Retrying scan session");
        self.inner.start_session(&mut core);
    }

    /// Stop scanning and release the camera
    ///
    /// A pending acquisition is cancelled; its stream, if it still arrives,
    /// is closed before this returns. Ends in IDLE.
    pub async fn stop(&self) {
        let (generation, tasks) = {
            let mut core = self.inner.lock();
            match core.snapshot.state {
                SessionState::Initializing | SessionState::Acquiring | SessionState::Scanning => {}
                state => {
                    debug!(state = %state, "Nothing to stop");
                    return;
                }
            }
            let generation = self.inner.begin_teardown(&mut core);
            (generation, std::mem::take(&mut core.tasks))
        };

        self.inner.device.release().await;
        join_all(tasks).await;

        let mut core = self.inner.lock();
        if core.generation == generation {
            self.inner.set_state(&mut core, SessionState::Idle);
        }
    }

    /// Scan view unmounted: cancel everything and release the camera
    ///
    /// When this returns no stream opened by this controller is left open.
    pub async fn unmount(&self) {
        let (generation, tasks) = {
            let mut core = self.inner.lock();
            if core.snapshot.state == SessionState::Uninitialized && core.tasks.is_empty() {
                return;
            }
            info!(state = %core.snapshot.state, "Scan view unmounted");
            core.surface = None;
            let generation = self.inner.begin_teardown(&mut core);
            (generation, std::mem::take(&mut core.tasks))
        };

        self.inner.device.release().await;
        join_all(tasks).await;

        let mut core = self.inner.lock();
        if core.generation == generation {
            core.snapshot.last_error = None;
            self.inner.set_state(&mut core, SessionState::Uninitialized);
        }
    }

    /// Flip the torch of the live stream
    ///
    /// Only acts while SCANNING. The new state is published at once and
    /// rolled back if the hardware refuses; torch failures are never
    /// surfaced as session errors. Returns the resulting torch state.
    pub async fn toggle_torch(&self) -> bool {
        let (generation, request, target) = {
            let mut core = self.inner.lock();
            if core.snapshot.state != SessionState::Scanning {
                debug!(state = %core.snapshot.state, "Torch toggle ignored outside scanning");
                return core.snapshot.torch_on;
            }
            let target = !core.snapshot.torch_on;
            core.snapshot.torch_on = target;
            core.torch_request += 1;
            self.inner.publish(&core);
            (core.generation, core.torch_request, target)
        };

        let applied = self.inner.device.apply_torch(target).await;

        let mut core = self.inner.lock();
        let current = core.generation == generation && core.snapshot.state == SessionState::Scanning;
        match applied {
            Ok(()) => {
                info!(on = target, "Torch switched");
                if current {
                    core.torch_confirmed = target;
                }
            }
            Err(err) => {
                debug!(
                    error = %err,
                    unsupported = err.is_ignorable(),
                    on = target,
                    "Torch switch failed, reverting"
                );
                // A later toggle owns the published state
                if current && core.torch_request == request {
                    core.snapshot.torch_on = core.torch_confirmed;
                    self.inner.publish(&core);
                }
            }
        }
        core.snapshot.torch_on
    }

    /// Decode a still image instead of the live feed
    ///
    /// Any live session is torn down and its stream released before the
    /// image is decoded. Success goes through the same path as a live
    /// match and ends in IDLE; failure enters ERROR with
    /// `Unknown("no code found")`. A result that arrives after an unmount or
    /// a new session is dropped without reaching the collaborators.
    pub async fn submit_still_image(&self, image: &[u8]) -> Result<ClassifiedPayload, CameraError> {
        let (generation, tasks) = {
            let mut core = self.inner.lock();
            info!(state = %core.snapshot.state, len = image.len(), "Still image submitted");
            let generation = self.inner.begin_teardown(&mut core);
            (generation, std::mem::take(&mut core.tasks))
        };

        self.inner.device.release().await;
        join_all(tasks).await;

        match self.inner.engine.decode_still_image(image).await {
            Ok(text) => {
                if self.inner.lock().generation != generation {
                    debug!(generation, "Still image decoded for a superseded session, dropping result");
                    return Err(CameraError::Unknown(SCAN_CANCELLED.to_string()));
                }
                let payload = self.inner.deliver(text);
                let mut core = self.inner.lock();
                if core.generation == generation {
                    core.snapshot.last_result = Some(payload.clone());
                    self.inner.set_state(&mut core, SessionState::Idle);
                }
                Ok(payload)
            }
            Err(failure) => {
                info!(reason = %failure, "No code in still image");
                let err = CameraError::Unknown(NO_CODE_FOUND.to_string());
                let mut core = self.inner.lock();
                if core.generation == generation {
                    core.snapshot.last_error = Some(err.clone());
                    self.inner.set_state(&mut core, SessionState::Error);
                }
                Err(err)
            }
        }
    }
}

impl<P: CameraPlatform, E: DecodeEngine> Inner<P, E> {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, core: &Core) {
        self.snapshot_tx.send_replace(core.snapshot.clone());
    }

    fn bump_generation(&self, core: &mut Core) -> u64 {
        core.generation += 1;
        self.generation_tx.send_replace(core.generation);
        core.generation
    }

    fn set_state(&self, core: &mut Core, state: SessionState) {
        let from = core.snapshot.state;
        core.snapshot.state = state;
        if state != SessionState::Scanning {
            core.snapshot.torch_on = false;
            core.torch_confirmed = false;
        }
        if from != state {
            info!(from = %from, to = %state, generation = core.generation, "Session state changed");
        }
        self.publish(core);
    }

    fn is_current(&self, generation: u64, state: SessionState) -> bool {
        let core = self.lock();
        core.generation == generation && core.snapshot.state == state
    }

    /// Stop decoding and invalidate the running session
    ///
    /// The caller releases the device afterwards.
    fn begin_teardown(&self, core: &mut Core) -> u64 {
        self.engine.stop_continuous_decode();
        let generation = self.bump_generation(core);
        self.set_state(core, SessionState::Stopping);
        generation
    }

    /// Enter INITIALIZING with a fresh generation and spawn the session
    fn start_session(self: &Arc<Self>, core: &mut Core) {
        let generation = self.bump_generation(core);
        core.snapshot.last_error = None;
        self.set_state(core, SessionState::Initializing);

        let surface = core.surface.clone();
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.run_session(generation, surface).await });

        core.tasks.retain(|task| !task.is_finished());
        core.tasks.push(task);
    }

    /// INITIALIZING → ACQUIRING → SCANNING
    async fn run_session(self: Arc<Self>, generation: u64, surface: Option<SurfaceReady>) {
        if let Some(mut surface) = surface {
            let timeout = self.config.surface_timeout();
            let ready = tokio::select! {
                ready = surface.wait(timeout) => ready,
                _ = self.superseded(generation) => {
                    debug!(generation, "Session cancelled while waiting for camera view");
                    return;
                }
            };
            if !ready {
                warn!(timeout_ms = timeout.as_millis() as u64, "Camera view never became ready");
                self.fail(generation, CameraError::Unknown(SURFACE_NOT_READY.to_string()))
                    .await;
                return;
            }
        }

        {
            let mut core = self.lock();
            if core.generation != generation || core.snapshot.state != SessionState::Initializing {
                return;
            }
            self.set_state(&mut core, SessionState::Acquiring);
        }

        let stream = match self.acquire_with_fallback(generation).await {
            Ok(stream) => stream,
            Err(err) => {
                self.fail(generation, err).await;
                return;
            }
        };

        let started = {
            let mut core = self.lock();
            if core.generation != generation || core.snapshot.state != SessionState::Acquiring {
                None
            } else {
                let callbacks = self.decode_callbacks(generation);
                let result = self.engine.start_continuous_decode(&stream, callbacks);
                if result.is_ok() {
                    core.snapshot.torch_on = false;
                    core.torch_confirmed = false;
                    self.set_state(&mut core, SessionState::Scanning);
                }
                Some(result)
            }
        };

        match started {
            None => {
                debug!(stream = %stream.id(), "Acquisition outlived its session");
                self.device.release_stream(&stream).await;
            }
            Some(Ok(())) => info!(
                stream = %stream.id(),
                facing = %stream.facing(),
                "Scanning"
            ),
            Some(Err(err)) => {
                error!(error = %err, "Failed to start decoding");
                self.fail(generation, err).await;
            }
        }
    }

    /// Environment camera first, user camera second
    ///
    /// A permission denial applies to every camera, so it ends the attempt
    /// without a fallback. When both cameras fail the environment camera's
    /// error is reported.
    async fn acquire_with_fallback(&self, generation: u64) -> Result<StreamHandle, CameraError> {
        let environment_err = match self.device.acquire(CameraFacing::Environment).await {
            Ok(stream) => return Ok(stream),
            Err(err) => err,
        };

        if environment_err == CameraError::PermissionDenied {
            return Err(environment_err);
        }
        if !self.is_current(generation, SessionState::Acquiring) {
            return Err(CameraError::Unknown(ACQUIRE_CANCELLED.to_string()));
        }

        warn!(error = %environment_err, "Environment camera unavailable, trying user camera");
        match self.device.acquire(CameraFacing::User).await {
            Ok(stream) => Ok(stream),
            // The preferred camera's failure is the one reported
            Err(user_err) => {
                debug!(user_error = %user_err, "User camera failed too");
                Err(environment_err)
            }
        }
    }

    /// Release whatever the session holds, then enter ERROR
    async fn fail(&self, generation: u64, err: CameraError) {
        {
            let core = self.lock();
            if core.generation != generation {
                debug!(error = %err, "Ignoring failure of a stale session");
                return;
            }
            self.engine.stop_continuous_decode();
        }

        self.device.release().await;

        let mut core = self.lock();
        if core.generation == generation {
            info!(error = %err, hint = ?err.retry_hint(), "Scan session failed");
            core.snapshot.last_error = Some(err);
            self.set_state(&mut core, SessionState::Error);
        }
    }

    /// Resolves once `generation` is no longer current
    async fn superseded(&self, generation: u64) {
        let mut rx = self.generation_tx.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if current != generation {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    fn decode_callbacks(self: &Arc<Self>, generation: u64) -> DecodeCallbacks {
        let on_match = Arc::downgrade(self);
        let on_lost = Arc::downgrade(self);
        DecodeCallbacks::new(
            move |text| {
                if let Some(inner) = Weak::upgrade(&on_match) {
                    inner.on_match(generation, text);
                }
            },
            move || trace!(generation, "No code in frame"),
            move || {
                if let Some(inner) = Weak::upgrade(&on_lost) {
                    inner.on_stream_lost(generation);
                }
            },
        )
    }

    /// First match wins: leave SCANNING before anything else happens
    fn on_match(self: &Arc<Self>, generation: u64, text: String) {
        let mut core = self.lock();
        if core.generation != generation || core.snapshot.state != SessionState::Scanning {
            trace!(generation, "Ignoring match outside its scanning session");
            return;
        }
        info!(len = text.len(), "Code matched, stopping session");
        let teardown = self.begin_teardown(&mut core);

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            inner.device.release().await;
            let payload = inner.deliver(text);

            let mut core = inner.lock();
            if core.generation == teardown {
                core.snapshot.last_result = Some(payload);
                inner.set_state(&mut core, SessionState::Idle);
            }
        });
        core.tasks.retain(|task| !task.is_finished());
        core.tasks.push(task);
    }

    /// The stream died under a running decode
    fn on_stream_lost(self: &Arc<Self>, generation: u64) {
        let mut core = self.lock();
        if core.generation != generation || core.snapshot.state != SessionState::Scanning {
            trace!(generation, "Ignoring stream loss outside its scanning session");
            return;
        }
        warn!("Camera stream ended while scanning");
        let teardown = self.begin_teardown(&mut core);

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            inner.device.release().await;

            let mut core = inner.lock();
            if core.generation == teardown {
                core.snapshot.last_error = Some(CameraError::Unknown(STREAM_ENDED.to_string()));
                inner.set_state(&mut core, SessionState::Error);
            }
        });
        core.tasks.retain(|task| !task.is_finished());
        core.tasks.push(task);
    }

    /// Classify and hand a decoded text to the collaborators
    fn deliver(&self, text: String) -> ClassifiedPayload {
        let payload = ClassifiedPayload::new(text);
        info!(kind = %payload.kind, len = payload.text.len(), "Code recognised");

        let collaborators = &self.collaborators;
        collaborators.sink.record(&payload.text, payload.kind, false);

        let preferences = collaborators.preferences.preferences();
        collaborators.feedback.on_success(&preferences);

        if preferences.auto_open && matches!(payload.kind, PayloadKind::Url) {
            info!(url = %payload.text, "Opening URL result");
            collaborators.opener.open_url(&payload.text);
        }
        payload
    }
}

async fn join_all(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Scan session task failed");
        }
    }
}
