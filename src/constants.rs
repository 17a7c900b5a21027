// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Application identifier used for config and data directories
pub const APP_ID: &str = "vioscan";

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.json";

/// History file name inside the data directory
pub const HISTORY_FILE: &str = "history.json";

/// Scan session timing
pub mod timing {
    use super::Duration;

    /// How long INITIALIZING waits for the camera view before giving up
    pub const SURFACE_READY_TIMEOUT: Duration = Duration::from_millis(3000);

    /// Decode attempts per second during continuous scanning
    pub const DECODE_FPS: u32 = 10;

    /// How long a capture thread may take to report its open result
    pub const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Pause between results in batch mode, so one code held in front of
    /// the camera is not recorded over and over
    pub const BATCH_RESCAN_DELAY: Duration = Duration::from_millis(1500);
}

/// Frame processing limits
pub mod frames {
    /// Frames are downscaled so the longest side fits this before decoding.
    /// Codes are large enough to survive it and rqrr runs much faster.
    pub const MAX_DECODE_DIMENSION: u32 = 640;

    /// Capture resolution requested from V4L2 devices
    pub const CAPTURE_WIDTH: u32 = 640;
    /// Capture resolution requested from V4L2 devices
    pub const CAPTURE_HEIGHT: u32 = 480;

    /// Number of mmap buffers for the capture stream
    pub const CAPTURE_BUFFERS: u32 = 4;
}

/// Card name fragments that identify a rear (environment facing) camera
pub const ENVIRONMENT_HINTS: [&str; 4] = ["rear", "back", "world", "environment"];
