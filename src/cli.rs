// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Live scanning with the camera
//! - Decoding image files
//! - Listing cameras, history and configuration

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use vioscan::Config;
use vioscan::backends::camera::V4l2Platform;
use vioscan::backends::camera::v4l2;
use vioscan::config::AfterScan;
use vioscan::constants::timing;
use vioscan::decoder::QrDecodeEngine;
use vioscan::feedback::TerminalFeedback;
use vioscan::history::{HistoryItem, HistoryStore};
use vioscan::payload::{ClassifiedPayload, PayloadKind};
use vioscan::scan::{
    Collaborators, ResultSink, ScanSessionController, SessionState, SurfaceReady, SystemUrlOpener,
};

type Controller = ScanSessionController<V4l2Platform, QrDecodeEngine>;

/// History entries shown by `history` and the `ShowHistory` policy
const HISTORY_LIMIT: usize = 20;

/// Scan with the camera until a code is found, or forever in batch mode
pub fn scan(
    mut config: Config,
    device: Option<PathBuf>,
    batch: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(device) = device {
        config.camera.environment_device = Some(device.clone());
        config.camera.user_device = Some(device);
    }
    let batch = batch || config.preferences.batch_mode;

    let history = Arc::new(HistoryStore::open_default()?);
    let controller = build_controller(&config, Arc::clone(&history), batch);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_scan(controller, &config, &history, batch))
}

async fn run_scan(
    controller: Controller,
    config: &Config,
    history: &HistoryStore,
    batch: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut updates = controller.subscribe();
    // No view to wait for in a terminal
    controller.mount(SurfaceReady::ready());
    eprintln!("Scanning... press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome: Result<(), Box<dyn std::error::Error>> = loop {
        let mut rescan = false;
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping scan");
                break Ok(());
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let snapshot = updates.borrow_and_update().clone();
                match snapshot.state {
                    SessionState::Idle => {
                        let Some(result) = snapshot.last_result else {
                            break Ok(());
                        };
                        print_result(config, history, &result);
                        if !batch {
                            break Ok(());
                        }
                        rescan = true;
                    }
                    SessionState::Error => {
                        let message = snapshot
                            .last_error
                            .map(|err| err.user_message())
                            .unwrap_or_else(|| "Scan failed".to_string());
                        break Err(message.into());
                    }
                    state => debug!(state = %state, "Scan session update"),
                }
            }
        }

        if rescan {
            if interrupted_during(timing::BATCH_RESCAN_DELAY, &mut ctrl_c).await {
                info!("Interrupted, stopping scan");
                break Ok(());
            }
            controller.request_scan();
        }
    };

    controller.unmount().await;
    outcome
}

/// Sleep for `delay` unless `interrupt` resolves first
///
/// Returns true when interrupted.
async fn interrupted_during<F>(delay: Duration, interrupt: &mut F) -> bool
where
    F: Future + Unpin,
{
    tokio::select! {
        _ = interrupt => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

/// Decode a code from an image file
pub fn scan_image(config: Config, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let image = std::fs::read(path)?;
    let history = Arc::new(HistoryStore::open_default()?);
    let controller = build_controller(&config, Arc::clone(&history), false);

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(controller.submit_still_image(&image));

    match result {
        Ok(payload) => {
            print_result(&config, &history, &payload);
            Ok(())
        }
        Err(err) => Err(err.user_message().into()),
    }
}

/// List all available cameras
pub fn list_cameras(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let cameras = v4l2::list_cameras(&config.camera);

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        println!("  {} {}", camera.path, camera.name);
        println!("      Driver: {}, facing: {}", camera.driver, camera.facing);
    }

    Ok(())
}

/// Print or clear the scan history
pub fn show_history(clear: bool) -> Result<(), Box<dyn std::error::Error>> {
    let history = HistoryStore::open_default()?;

    if clear {
        let count = history.len();
        history.clear()?;
        println!("Deleted {} history entries.", count);
        return Ok(());
    }

    print_history(&history.items());
    Ok(())
}

/// Print where the config lives and what it contains
pub fn show_config(config: &Config, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) => println!("Config file: {} (not created, using defaults)", path.display()),
        None => println!("Config file: none (no config directory)"),
    }
    if let Some(path) = HistoryStore::default_path() {
        println!("History file: {}", path.display());
    }
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn build_controller(config: &Config, history: Arc<HistoryStore>, batch: bool) -> Controller {
    let sink: Arc<dyn ResultSink> = if batch {
        Arc::new(SkipRepeats::new(history))
    } else {
        history
    };

    let collaborators = Collaborators {
        sink,
        feedback: Arc::new(TerminalFeedback),
        preferences: Arc::new(config.preferences),
        opener: Arc::new(SystemUrlOpener),
    };

    ScanSessionController::new(
        Arc::new(V4l2Platform::new(config.camera.clone())),
        QrDecodeEngine::new(&config.scan),
        collaborators,
        config.scan.clone(),
    )
}

/// Batch mode sink that drops a result identical to the previous one
struct SkipRepeats {
    inner: Arc<HistoryStore>,
    last: Mutex<Option<String>>,
}

impl SkipRepeats {
    fn new(inner: Arc<HistoryStore>) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }
}

impl ResultSink for SkipRepeats {
    fn record(&self, content: &str, kind: PayloadKind, generated: bool) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(content) {
            debug!("Skipping repeated batch result");
            return;
        }
        *last = Some(content.to_string());
        self.inner.record(content, kind, generated);
    }
}

fn print_result(config: &Config, history: &HistoryStore, payload: &ClassifiedPayload) {
    match config.after_scan {
        AfterScan::ShowResult => print_payload(payload),
        AfterScan::ShowHistory => print_history(&history.items()),
    }
}

fn print_payload(payload: &ClassifiedPayload) {
    println!("{}", payload.kind.display_name());
    match payload.wifi() {
        Some(wifi) => {
            println!("  Network:  {}", wifi.ssid);
            println!("  Security: {}", wifi.security.display_name());
            if let Some(password) = &wifi.password {
                println!("  Password: {}", password);
            }
            if wifi.hidden {
                println!("  Hidden network");
            }
        }
        None => println!("  {}", payload.text),
    }
}

fn print_history(items: &[HistoryItem]) {
    if items.is_empty() {
        println!("No scans yet.");
        return;
    }

    for item in items.iter().take(HISTORY_LIMIT) {
        let when = item.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let star = if item.is_favorite { "*" } else { " " };
        println!("{} {}  {:<13} {}", star, when, item.kind.display_name(), item.content);
    }
    if items.len() > HISTORY_LIMIT {
        println!("  ... {} more", items.len() - HISTORY_LIMIT);
    }
}
