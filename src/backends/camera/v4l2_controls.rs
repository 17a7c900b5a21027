// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 flash control interface
//!
//! Sensor drivers with an attached LED expose it through the V4L2 flash
//! control class. Plain UVC webcams do not, in which case the ioctl fails
//! with `EINVAL` and the caller falls back to sysfs LEDs.

use crate::errors::{PlatformError, PlatformErrorCode, PlatformResult};
use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use tracing::debug;

// ===== V4L2 Control Class Bases =====
const V4L2_CTRL_CLASS_FLASH: u32 = 0x009c0000;
const V4L2_CID_FLASH_CLASS_BASE: u32 = V4L2_CTRL_CLASS_FLASH | 0x900;

/// LED mode: none, flash or torch
pub const V4L2_CID_FLASH_LED_MODE: u32 = V4L2_CID_FLASH_CLASS_BASE + 1;

/// `V4L2_FLASH_LED_MODE_NONE`
const FLASH_LED_MODE_NONE: i32 = 0;
/// `V4L2_FLASH_LED_MODE_TORCH`
const FLASH_LED_MODE_TORCH: i32 = 2;

/// `_IOWR('V', 28, struct v4l2_control)`
const VIDIOC_S_CTRL: libc::c_ulong = 0xc008_561c;

/// V4L2 control structure for VIDIOC_S_CTRL
#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

/// Switch the device's flash LED between torch and off
///
/// Opens a second descriptor on the node; V4L2 allows control access
/// alongside an active capture stream.
pub fn set_torch_mode(device_path: &str, on: bool) -> PlatformResult<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(device_path)
        .map_err(PlatformError::from)?;

    let ctrl = V4l2Control {
        id: V4L2_CID_FLASH_LED_MODE,
        value: if on {
            FLASH_LED_MODE_TORCH
        } else {
            FLASH_LED_MODE_NONE
        },
    };

    let result = unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_S_CTRL as _, &ctrl as *const _) };

    if result == 0 {
        debug!(device_path, on, "Set V4L2 flash LED mode");
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        // Control not present on this device
        Some(libc::EINVAL) | Some(libc::ENOTTY) => Err(PlatformError::new(
            PlatformErrorCode::NotSupported,
            format!("{} has no flash control", device_path),
        )),
        _ => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_led_mode_id() {
        // Matches V4L2_CID_FLASH_LED_MODE from videodev2.h
        assert_eq!(V4L2_CID_FLASH_LED_MODE, 0x009c0901);
    }

    #[test]
    fn test_missing_device_is_not_found() {
        let err = set_torch_mode("/dev/vioscan-does-not-exist", true).unwrap_err();
        assert_eq!(err.code, PlatformErrorCode::NotFound);
    }
}
