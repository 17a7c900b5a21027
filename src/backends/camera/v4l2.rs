// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera platform
//!
//! Opens `/dev/video*` capture nodes with the v4l crate. Each open stream
//! gets its own capture thread which negotiates a format, maps buffers and
//! publishes the latest frame until it is stopped or the device fails.
//!
//! V4L2 has no notion of facing mode. A node is treated as environment
//! facing if the config says so or its card name looks like a rear camera;
//! everything else is user facing.

use super::frame_loop::{CaptureLoopController, StopSignal};
use super::types::*;
use super::{CameraPlatform, v4l2_controls};
use crate::config::CameraSettings;
use crate::constants::{self, frames, timing};
use crate::errors::{PlatformError, PlatformErrorCode, PlatformResult};
use crate::flash::{self, FlashHardware};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

/// A stream opened by this platform
struct ActiveStream {
    device_path: String,
    capture: CaptureLoopController,
    torch_on: bool,
}

/// Linux V4L2 implementation of [`CameraPlatform`]
pub struct V4l2Platform {
    settings: CameraSettings,
    leds_dir: PathBuf,
    streams: Mutex<HashMap<StreamId, ActiveStream>>,
}

impl V4l2Platform {
    /// Create a platform using the given device overrides
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            leds_dir: PathBuf::from(flash::LEDS_DIR),
            streams: Mutex::new(HashMap::new()),
        }
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<StreamId, ActiveStream>> {
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for V4l2Platform {
    fn default() -> Self {
        Self::new(CameraSettings::default())
    }
}

#[async_trait]
impl CameraPlatform for V4l2Platform {
    async fn open(&self, facing: CameraFacing) -> PlatformResult<StreamHandle> {
        let settings = self.settings.clone();
        let device = tokio::task::spawn_blocking(move || select_device(&settings, facing))
            .await
            .map_err(|e| PlatformError::new(PlatformErrorCode::Other, e.to_string()))??;

        info!(device = %device.path, name = %device.name, %facing, "Opening V4L2 camera");

        let (frame_tx, frame_rx) = frame_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let path = device.path.clone();

        let capture = CaptureLoopController::spawn("v4l2-capture", move |stop| {
            capture_thread(&path, frame_tx, ready_tx, stop);
        })
        .map_err(PlatformError::from)?;

        let ready = match tokio::time::timeout(timing::OPEN_TIMEOUT, ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PlatformError::new(
                PlatformErrorCode::Other,
                "capture thread exited before reporting",
            )),
            Err(_) => Err(PlatformError::new(
                PlatformErrorCode::NotReadable,
                "timed out starting video source",
            )),
        };

        if let Err(e) = ready {
            warn!(device = %device.path, error = %e, "Failed to open V4L2 camera");
            tokio::task::spawn_blocking(move || capture.stop()).await.ok();
            return Err(e);
        }

        let handle = StreamHandle::new(facing, device.name.clone(), frame_rx);
        self.streams().insert(
            handle.id(),
            ActiveStream {
                device_path: device.path,
                capture,
                torch_on: false,
            },
        );

        Ok(handle)
    }

    async fn set_torch(&self, stream: &StreamHandle, on: bool) -> PlatformResult<()> {
        let device_path = self
            .streams()
            .get(&stream.id())
            .map(|active| active.device_path.clone())
            .ok_or_else(|| {
                PlatformError::new(PlatformErrorCode::Other, format!("stream {} not open", stream.id()))
            })?;

        let leds_dir = self.leds_dir.clone();
        tokio::task::spawn_blocking(move || switch_torch(&device_path, &leds_dir, on))
            .await
            .map_err(|e| PlatformError::new(PlatformErrorCode::Other, e.to_string()))??;

        if let Some(active) = self.streams().get_mut(&stream.id()) {
            active.torch_on = on;
        }
        Ok(())
    }

    async fn close(&self, stream: StreamHandle) {
        let Some(active) = self.streams().remove(&stream.id()) else {
            debug!(stream = %stream.id(), "Close for unknown stream ignored");
            return;
        };

        info!(stream = %stream.id(), device = %active.device_path, "Closing V4L2 camera");

        let leds_dir = self.leds_dir.clone();
        let joined = tokio::task::spawn_blocking(move || {
            if active.torch_on
                && let Err(e) = switch_torch(&active.device_path, &leds_dir, false)
            {
                warn!(error = %e, "Failed to switch torch off on close");
            }
            active.capture.stop();
        })
        .await;

        if let Err(e) = joined {
            warn!(error = %e, "Capture shutdown task failed");
        }
    }
}

/// Pick the device for a facing mode
fn select_device(settings: &CameraSettings, facing: CameraFacing) -> PlatformResult<CameraDevice> {
    let Enumeration { cameras, denied } = enumerate(settings);
    if cameras.is_empty() {
        return Err(if denied.is_empty() {
            PlatformError::new(PlatformErrorCode::NotFound, "no video capture devices")
        } else {
            PlatformError::new(
                PlatformErrorCode::NotAllowed,
                format!("no permission to open {}", denied.join(", ")),
            )
        });
    }

    cameras
        .into_iter()
        .find(|camera| camera.facing == facing)
        .ok_or_else(|| {
            PlatformError::new(
                PlatformErrorCode::Overconstrained,
                format!("no {} facing camera", facing),
            )
        })
}

/// Torch through the V4L2 flash control, falling back to sysfs LEDs
fn switch_torch(device_path: &str, leds_dir: &Path, on: bool) -> PlatformResult<()> {
    match v4l2_controls::set_torch_mode(device_path, on) {
        Err(e) if e.code == PlatformErrorCode::NotSupported => {
            debug!(device_path, "No V4L2 flash control, trying sysfs LEDs");
            FlashHardware::detect_in(leds_dir).set_torch(on)
        }
        other => other,
    }
}

/// Enumerate V4L2 capture devices
///
/// Nodes without any capture format (UVC metadata nodes) are skipped.
pub fn list_cameras(settings: &CameraSettings) -> Vec<CameraDevice> {
    enumerate(settings).cameras
}

/// Capture devices plus the nodes we were not allowed to open
struct Enumeration {
    cameras: Vec<CameraDevice>,
    denied: Vec<String>,
}

fn enumerate(settings: &CameraSettings) -> Enumeration {
    let mut paths: Vec<PathBuf> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("video"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut cameras = Vec::new();
    let mut denied = Vec::new();
    for path in paths {
        let dev = match Device::with_path(&path) {
            Ok(dev) => dev,
            Err(e) => {
                if PlatformError::from(e).code == PlatformErrorCode::NotAllowed {
                    denied.push(path.to_string_lossy().to_string());
                }
                continue;
            }
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        let has_capture_format = dev
            .enum_formats()
            .map(|formats| !formats.is_empty())
            .unwrap_or(false);
        if !has_capture_format {
            trace!(path = %path.display(), "Skipping node without capture formats");
            continue;
        }

        let path_str = path.to_string_lossy().to_string();
        let facing = resolve_facing(settings, &path, &caps.card);
        debug!(path = %path_str, card = %caps.card, %facing, "Found V4L2 camera");

        cameras.push(CameraDevice {
            name: caps.card,
            path: path_str,
            driver: caps.driver,
            facing,
        });
    }

    Enumeration { cameras, denied }
}

/// Facing mode for a device: config override first, then card name hints
pub fn resolve_facing(settings: &CameraSettings, path: &Path, card: &str) -> CameraFacing {
    if settings.environment_device.as_deref() == Some(path) {
        return CameraFacing::Environment;
    }
    if settings.user_device.as_deref() == Some(path) {
        return CameraFacing::User;
    }

    let card = card.to_lowercase();
    if constants::ENVIRONMENT_HINTS
        .iter()
        .any(|hint| card.contains(hint))
    {
        CameraFacing::Environment
    } else {
        CameraFacing::User
    }
}

/// Body of a capture thread
///
/// Reports the open result through `ready` exactly once, then publishes
/// frames until stopped. Returning drops `frames`, which ends the stream.
fn capture_thread(
    path: &str,
    frames: FrameSender,
    ready: oneshot::Sender<PlatformResult<()>>,
    stop: StopSignal,
) {
    let mut dev = match Device::with_path(path) {
        Ok(dev) => dev,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };

    let (format, pixel_format) = match negotiate_format(&mut dev) {
        Ok(negotiated) => negotiated,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut stream = match MmapStream::with_buffers(&mut dev, Type::VideoCapture, frames::CAPTURE_BUFFERS)
    {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };

    info!(
        path,
        width = format.width,
        height = format.height,
        fourcc = ?format.fourcc,
        "V4L2 capture stream started"
    );

    if ready.send(Ok(())).is_err() {
        debug!(path, "Opener went away before the stream started");
        return;
    }

    while !stop.is_stopped() {
        match stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                let used = if used == 0 { buf.len() } else { used };
                let frame = CameraFrame {
                    width: format.width,
                    height: format.height,
                    data: Arc::from(&buf[..used]),
                    format: pixel_format,
                    stride: format.stride,
                    captured_at: Instant::now(),
                };
                frames.send_replace(Some(Arc::new(frame)));
            }
            Err(e) => {
                warn!(path, error = %e, "V4L2 capture failed, ending stream");
                break;
            }
        }
    }
}

/// Ask for YUYV, then MJPEG, at the capture resolution
fn negotiate_format(dev: &mut Device) -> PlatformResult<(Format, PixelFormat)> {
    let mut last = dev.format().map_err(PlatformError::from)?;

    for fourcc in [b"YUYV", b"MJPG"] {
        let mut wanted = last.clone();
        wanted.width = frames::CAPTURE_WIDTH;
        wanted.height = frames::CAPTURE_HEIGHT;
        wanted.fourcc = FourCC::new(fourcc);

        let actual = dev.set_format(&wanted).map_err(PlatformError::from)?;
        if let Some(pixel_format) = PixelFormat::from_fourcc(&actual.fourcc.repr) {
            return Ok((actual, pixel_format));
        }
        last = actual;
    }

    Err(PlatformError::new(
        PlatformErrorCode::NotSupported,
        format!("no decodable pixel format (device offers {:?})", last.fourcc),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_facing_by_name() {
        let settings = CameraSettings::default();
        let path = Path::new("/dev/video0");
        assert_eq!(
            resolve_facing(&settings, path, "Integrated Camera"),
            CameraFacing::User
        );
        assert_eq!(
            resolve_facing(&settings, path, "ov8858 Rear Camera"),
            CameraFacing::Environment
        );
        assert_eq!(
            resolve_facing(&settings, path, "Back"),
            CameraFacing::Environment
        );
    }

    #[test]
    fn test_resolve_facing_config_override() {
        let settings = CameraSettings {
            environment_device: Some(PathBuf::from("/dev/video2")),
            user_device: Some(PathBuf::from("/dev/video4")),
        };
        assert_eq!(
            resolve_facing(&settings, Path::new("/dev/video2"), "USB Camera"),
            CameraFacing::Environment
        );
        assert_eq!(
            resolve_facing(&settings, Path::new("/dev/video4"), "Rear Camera"),
            CameraFacing::User
        );
    }
}
