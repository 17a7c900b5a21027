// SPDX-License-Identifier: GPL-3.0-only

//! Test doubles for scan session tests
//!
//! Each double is a cheap handle over shared state so a test can keep
//! inspecting it after handing it to the controller.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use vioscan::backends::camera::{
    CameraFacing, CameraPlatform, FrameSender, StreamHandle, StreamId, frame_channel,
};
use vioscan::config::{Preferences, ScanConfig};
use vioscan::decoder::{DecodeCallbacks, DecodeEngine};
use vioscan::errors::{CameraError, DecodeFailure, PlatformError, PlatformErrorCode, PlatformResult};
use vioscan::payload::PayloadKind;
use vioscan::scan::{
    Collaborators, FeedbackNotifier, ResultSink, ScanSessionController, SessionSnapshot,
    SessionState, UrlOpener,
};

// ===== Platform =====

/// Camera platform with scripted failures and a gate for slow opens
pub struct FakePlatform {
    failures: Mutex<HashMap<CameraFacing, PlatformError>>,
    torch_failure: Mutex<Option<PlatformErrorCode>>,
    gate: watch::Sender<bool>,
    torch_gate: watch::Sender<bool>,
    attempts: Mutex<Vec<CameraFacing>>,
    streams: Mutex<HashMap<StreamId, FrameSender>>,
    opened: Mutex<u32>,
    closed: Mutex<u32>,
    torch_calls: Mutex<Vec<bool>>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        let (torch_gate, _) = watch::channel(true);
        Arc::new(Self {
            failures: Mutex::new(HashMap::new()),
            torch_failure: Mutex::new(None),
            gate,
            torch_gate,
            attempts: Mutex::new(Vec::new()),
            streams: Mutex::new(HashMap::new()),
            opened: Mutex::new(0),
            closed: Mutex::new(0),
            torch_calls: Mutex::new(Vec::new()),
        })
    }

    /// Make every open of `facing` fail with `code`
    pub fn fail(&self, facing: CameraFacing, code: PlatformErrorCode, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(facing, PlatformError::new(code, message));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn fail_torch(&self, code: PlatformErrorCode) {
        *self.torch_failure.lock().unwrap() = Some(code);
    }

    /// Park every open until [`open_gate`](Self::open_gate)
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Park every torch switch until [`open_torch_gate`](Self::open_torch_gate)
    pub fn close_torch_gate(&self) {
        self.torch_gate.send_replace(false);
    }

    pub fn open_torch_gate(&self) {
        self.torch_gate.send_replace(true);
    }

    /// Facings requested so far, in order
    pub fn attempts(&self) -> Vec<CameraFacing> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn opened(&self) -> u32 {
        *self.opened.lock().unwrap()
    }

    pub fn closed(&self) -> u32 {
        *self.closed.lock().unwrap()
    }

    /// Streams opened and not yet closed
    pub fn live(&self) -> u32 {
        self.opened() - self.closed()
    }

    pub fn torch_calls(&self) -> Vec<bool> {
        self.torch_calls.lock().unwrap().clone()
    }

    /// Drop every frame publisher, as if the devices vanished
    pub fn kill_streams(&self) {
        self.streams.lock().unwrap().clear();
    }
}

#[async_trait]
impl CameraPlatform for FakePlatform {
    async fn open(&self, facing: CameraFacing) -> PlatformResult<StreamHandle> {
        self.attempts.lock().unwrap().push(facing);

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await.map(|_| ());

        if let Some(err) = self.failures.lock().unwrap().get(&facing).cloned() {
            return Err(err);
        }

        let (tx, rx) = frame_channel();
        let stream = StreamHandle::new(facing, format!("fake {}", facing), rx);
        self.streams.lock().unwrap().insert(stream.id(), tx);
        *self.opened.lock().unwrap() += 1;
        Ok(stream)
    }

    async fn set_torch(&self, _stream: &StreamHandle, on: bool) -> PlatformResult<()> {
        self.torch_calls.lock().unwrap().push(on);

        let mut gate = self.torch_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await.map(|_| ());

        match *self.torch_failure.lock().unwrap() {
            Some(code) => Err(PlatformError::new(code, "torch refused")),
            None => Ok(()),
        }
    }

    async fn close(&self, stream: StreamHandle) {
        self.streams.lock().unwrap().remove(&stream.id());
        *self.closed.lock().unwrap() += 1;
    }
}

// ===== Decode engine =====

#[derive(Default)]
struct EngineState {
    running: bool,
    starts: u32,
    stops: u32,
    callbacks: Vec<DecodeCallbacks>,
    start_failure: Option<CameraError>,
    still_result: Option<Result<String, DecodeFailure>>,
    /// Platform live stream count seen by each still decode
    live_at_still_decode: Vec<u32>,
}

/// Decode engine driven by the test instead of frames
#[derive(Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
    platform: Option<Arc<FakePlatform>>,
    still_gate: Arc<watch::Sender<bool>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        let (still_gate, _) = watch::channel(true);
        Self {
            state: Arc::default(),
            platform: None,
            still_gate: Arc::new(still_gate),
        }
    }
}

impl FakeEngine {
    /// Engine that records how many streams are live when decoding stills
    pub fn observing(platform: Arc<FakePlatform>) -> Self {
        Self {
            platform: Some(platform),
            ..Self::default()
        }
    }

    /// Park still image decodes until [`open_still_gate`](Self::open_still_gate)
    pub fn close_still_gate(&self) {
        self.still_gate.send_replace(false);
    }

    pub fn open_still_gate(&self) {
        self.still_gate.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    pub fn starts(&self) -> u32 {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> u32 {
        self.state.lock().unwrap().stops
    }

    pub fn fail_start(&self, err: CameraError) {
        self.state.lock().unwrap().start_failure = Some(err);
    }

    pub fn set_still_result(&self, result: Result<String, DecodeFailure>) {
        self.state.lock().unwrap().still_result = Some(result);
    }

    pub fn live_at_still_decode(&self) -> Vec<u32> {
        self.state.lock().unwrap().live_at_still_decode.clone()
    }

    /// Callbacks of the most recent start
    pub fn callbacks(&self) -> DecodeCallbacks {
        self.callbacks_at(self.starts() as usize - 1)
    }

    /// Callbacks of the `index`-th start
    pub fn callbacks_at(&self, index: usize) -> DecodeCallbacks {
        self.state.lock().unwrap().callbacks[index].clone()
    }

    pub fn emit_match(&self, text: &str) {
        self.callbacks().matched(text.to_string());
    }

    pub fn emit_miss(&self) {
        self.callbacks().missed();
    }

    pub fn emit_stream_lost(&self) {
        self.callbacks().stream_lost();
    }
}

#[async_trait]
impl DecodeEngine for FakeEngine {
    fn start_continuous_decode(
        &self,
        _stream: &StreamHandle,
        callbacks: DecodeCallbacks,
    ) -> Result<(), CameraError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.start_failure.clone() {
            return Err(err);
        }
        state.running = true;
        state.starts += 1;
        state.callbacks.push(callbacks);
        Ok(())
    }

    fn stop_continuous_decode(&self) {
        let mut state = self.state.lock().unwrap();
        if state.running {
            state.running = false;
            state.stops += 1;
        }
    }

    async fn decode_still_image(&self, _image: &[u8]) -> Result<String, DecodeFailure> {
        let mut gate = self.still_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await.map(|_| ());

        let live = self.platform.as_ref().map(|p| p.live()).unwrap_or(0);
        let mut state = self.state.lock().unwrap();
        state.live_at_still_decode.push(live);
        state
            .still_result
            .clone()
            .unwrap_or(Err(DecodeFailure::NoCodeFound))
    }
}

// ===== Collaborators =====

#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(String, PayloadKind, bool)>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<(String, PayloadKind, bool)> {
        self.records.lock().unwrap().clone()
    }
}

impl ResultSink for RecordingSink {
    fn record(&self, content: &str, kind: PayloadKind, generated: bool) {
        self.records
            .lock()
            .unwrap()
            .push((content.to_string(), kind, generated));
    }
}

#[derive(Default)]
pub struct RecordingFeedback {
    cues: Mutex<Vec<Preferences>>,
}

impl RecordingFeedback {
    pub fn cues(&self) -> Vec<Preferences> {
        self.cues.lock().unwrap().clone()
    }
}

impl FeedbackNotifier for RecordingFeedback {
    fn on_success(&self, preferences: &Preferences) {
        self.cues.lock().unwrap().push(*preferences);
    }
}

#[derive(Default)]
pub struct RecordingOpener {
    urls: Mutex<Vec<String>>,
}

impl RecordingOpener {
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl UrlOpener for RecordingOpener {
    fn open_url(&self, url: &str) {
        self.urls.lock().unwrap().push(url.to_string());
    }
}

// ===== Harness =====

pub type TestController = ScanSessionController<FakePlatform, FakeEngine>;

pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub engine: FakeEngine,
    pub sink: Arc<RecordingSink>,
    pub feedback: Arc<RecordingFeedback>,
    pub opener: Arc<RecordingOpener>,
    pub controller: TestController,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_preferences(Preferences::default())
    }

    pub fn with_preferences(preferences: Preferences) -> Self {
        let platform = FakePlatform::new();
        let engine = FakeEngine::observing(Arc::clone(&platform));
        let sink = Arc::new(RecordingSink::default());
        let feedback = Arc::new(RecordingFeedback::default());
        let opener = Arc::new(RecordingOpener::default());

        let collaborators = Collaborators {
            sink: sink.clone(),
            feedback: feedback.clone(),
            preferences: Arc::new(preferences),
            opener: opener.clone(),
        };
        let controller = ScanSessionController::new(
            Arc::clone(&platform),
            engine.clone(),
            collaborators,
            ScanConfig::default(),
        );

        Self {
            platform,
            engine,
            sink,
            feedback,
            opener,
            controller,
        }
    }
}

/// Wait until the controller publishes `state`
pub async fn wait_for_state(controller: &TestController, state: SessionState) -> SessionSnapshot {
    let mut rx = controller.subscribe();
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        rx.wait_for(|snapshot| snapshot.state == state)
            .await
            .map(|snapshot| snapshot.clone())
    })
    .await;

    match waited {
        Ok(Ok(snapshot)) => snapshot,
        _ => panic!(
            "timed out waiting for {}, controller is {}",
            state,
            controller.state()
        ),
    }
}

/// Let spawned session tasks run
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
