// SPDX-License-Identifier: MPL-2.0

//! Camera platform abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ ScanSessionController│
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │    DeviceSession     │  ← one stream at a time, error mapping
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CameraPlatform trait │  ← open / torch / close
//! └──────────┬───────────┘
//!            │
//!            ▼
//!       ┌────────┐
//!       │  V4L2  │  ← Concrete implementation
//!       └────────┘
//! ```

pub mod frame_loop;
pub mod types;
pub mod v4l2;
pub mod v4l2_controls;

pub use types::*;
pub use v4l2::V4l2Platform;

use crate::errors::PlatformResult;
use async_trait::async_trait;

/// Platform media API
///
/// Implementations touch hardware; everything above them treats a stream as
/// an opaque [`StreamHandle`].
#[async_trait]
pub trait CameraPlatform: Send + Sync + 'static {
    /// Open a stream for the requested facing mode
    ///
    /// Returns a handle whose frame channel is live until [`close`] is
    /// called or the device goes away.
    ///
    /// [`close`]: CameraPlatform::close
    async fn open(&self, facing: CameraFacing) -> PlatformResult<StreamHandle>;

    /// Switch the torch of the stream's device
    ///
    /// Hardware without a controllable torch reports
    /// [`crate::errors::PlatformErrorCode::NotSupported`].
    async fn set_torch(&self, stream: &StreamHandle, on: bool) -> PlatformResult<()>;

    /// Stop the stream and release the device
    ///
    /// Never fails; problems during shutdown are logged.
    async fn close(&self, stream: StreamHandle);
}
