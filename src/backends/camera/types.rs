// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;

/// Which physical camera is requested
///
/// Acquisition prefers [`CameraFacing::Environment`] and falls back to
/// [`CameraFacing::User`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraFacing {
    /// Rear camera, pointing away from the user
    Environment,
    /// Front camera, pointing at the user
    User,
}

impl CameraFacing {
    /// Acquisition preference order
    pub const PREFERENCE: [CameraFacing; 2] = [CameraFacing::Environment, CameraFacing::User];
}

impl std::fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraFacing::Environment => write!(f, "environment"),
            CameraFacing::User => write!(f, "user"),
        }
    }
}

/// Pixel format for camera frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    /// Common raw format from webcam sensors
    Yuyv,
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    Rgba8,
    /// Motion JPEG - each buffer is a complete JPEG image
    Mjpeg,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats, `None` for compressed ones
    pub fn bytes_per_pixel(&self) -> Option<u32> {
        match self {
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Yuyv => Some(2),
            PixelFormat::Rgba8 => Some(4),
            PixelFormat::Mjpeg => None,
        }
    }

    /// Map a V4L2 FourCC to a format we can decode
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"GREY" | b"Y800" => Some(PixelFormat::Gray8),
            b"YUYV" | b"YUY2" => Some(PixelFormat::Yuyv),
            b"AB24" | b"RGBA" => Some(PixelFormat::Rgba8),
            b"MJPG" | b"JPEG" => Some(PixelFormat::Mjpeg),
            _ => None,
        }
    }
}

/// A single captured frame
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Raw frame bytes
    pub data: Arc<[u8]>,
    /// Pixel format of the data
    pub format: PixelFormat,
    /// Row stride in bytes (may include padding); unused for MJPEG
    pub stride: u32,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
}

/// Publishing side of a stream's latest-frame channel
///
/// Dropping the sender marks the stream as dead.
pub type FrameSender = watch::Sender<Option<Arc<CameraFrame>>>;

/// Subscribing side of a stream's latest-frame channel
pub type FrameReceiver = watch::Receiver<Option<Arc<CameraFrame>>>;

/// Create a latest-frame channel for a new stream
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    watch::channel(None)
}

/// Unique id of an opened stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        StreamId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque reference to a live camera stream
///
/// Cheap to clone. The only way to read frames is [`StreamHandle::frames`];
/// the stream is over once the platform drops its [`FrameSender`].
#[derive(Clone)]
pub struct StreamHandle {
    id: StreamId,
    facing: CameraFacing,
    label: Arc<str>,
    frames: FrameReceiver,
}

impl StreamHandle {
    /// Wrap a freshly opened stream
    pub fn new(facing: CameraFacing, label: impl Into<Arc<str>>, frames: FrameReceiver) -> Self {
        Self {
            id: StreamId::next(),
            facing,
            label: label.into(),
            frames,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Facing mode the platform actually opened
    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    /// Device label (card name or path)
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Subscribe to the stream's latest frame
    pub fn frames(&self) -> FrameReceiver {
        self.frames.clone()
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id)
            .field("facing", &self.facing)
            .field("label", &self.label)
            .finish()
    }
}

/// Camera device found during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    /// Card name reported by the driver
    pub name: String,
    /// Device node, e.g. `/dev/video0`
    pub path: String,
    /// Driver name
    pub driver: String,
    /// Facing resolved from config or the card name
    pub facing: CameraFacing,
}
