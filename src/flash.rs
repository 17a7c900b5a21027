// SPDX-License-Identifier: GPL-3.0-only

//! Hardware flash LED control via Linux sysfs
//!
//! Discovers and controls flash LEDs exposed at `/sys/class/leds/*:flash`.
//! Uses torch mode (brightness file) which is group-writable by `feedbackd`,
//! avoiding the root-only `flash_strobe`/`flash_brightness` interface.

use crate::errors::{PlatformError, PlatformErrorCode, PlatformResult};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default sysfs LED class directory
pub const LEDS_DIR: &str = "/sys/class/leds";

/// A flash LED device discovered via sysfs
#[derive(Debug, Clone)]
pub struct FlashDevice {
    /// Sysfs path, e.g. `/sys/class/leds/white:flash`
    path: PathBuf,
    /// Maximum brightness value (from `max_brightness` file)
    max_brightness: u32,
    /// Human-readable name (directory basename)
    name: String,
}

impl FlashDevice {
    /// Get the device name (e.g. "white:flash")
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set raw brightness value (0 = off, max_brightness = full)
    pub fn set_brightness(&self, value: u32) -> io::Result<()> {
        let clamped = value.min(self.max_brightness);
        std::fs::write(self.path.join("brightness"), clamped.to_string())
    }

    /// Turn off the LED
    pub fn off(&self) -> io::Result<()> {
        self.set_brightness(0)
    }

    /// Turn on at a fraction of max brightness (0.0 = off, 1.0 = full)
    pub fn torch(&self, intensity: f32) -> io::Result<()> {
        let clamped = intensity.clamp(0.0, 1.0);
        let value = (clamped * self.max_brightness as f32).round() as u32;
        self.set_brightness(value)
    }
}

/// Result of hardware flash detection.
///
/// Separates "hardware exists" from "we can control it" so callers can
/// report a permission problem instead of a missing feature.
#[derive(Debug, Default)]
pub struct FlashHardware {
    /// Devices we can actually control (writable)
    pub devices: Vec<FlashDevice>,
    /// LEDs that exist but whose brightness file is not writable
    pub unwritable: Vec<String>,
}

impl FlashHardware {
    /// Scan the default sysfs directory
    pub fn detect() -> FlashHardware {
        Self::detect_in(Path::new(LEDS_DIR))
    }

    /// Scan `leds_dir` for `*:flash` entries
    pub fn detect_in(leds_dir: &Path) -> FlashHardware {
        let Ok(entries) = std::fs::read_dir(leds_dir) else {
            debug!(dir = %leds_dir.display(), "Cannot read LED directory, flash discovery skipped");
            return FlashHardware::default();
        };

        let mut hardware = FlashHardware::default();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };

            // Match entries like "white:flash", "yellow:flash"
            if !name_str.ends_with(":flash") {
                continue;
            }

            let led_path = entry.path();
            let brightness_path = led_path.join("brightness");
            let max_brightness_path = led_path.join("max_brightness");

            let max_brightness = match std::fs::read_to_string(&max_brightness_path) {
                Ok(s) => match s.trim().parse::<u32>() {
                    Ok(v) if v > 0 => v,
                    _ => {
                        warn!(
                            path = %max_brightness_path.display(),
                            "Invalid max_brightness value"
                        );
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        path = %max_brightness_path.display(),
                        error = %e,
                        "Cannot read max_brightness"
                    );
                    continue;
                }
            };

            // Attempt write access
            match std::fs::OpenOptions::new()
                .write(true)
                .open(&brightness_path)
            {
                Ok(_) => {
                    info!(name = name_str, max_brightness, "Discovered flash LED");
                    hardware.devices.push(FlashDevice {
                        path: led_path,
                        max_brightness,
                        name: name_str.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        path = %brightness_path.display(),
                        "Flash LED found but not writable"
                    );
                    hardware.unwritable.push(name_str.to_string());
                }
            }
        }

        // Sort by name for deterministic ordering (white before yellow)
        hardware.devices.sort_by(|a, b| a.name.cmp(&b.name));
        hardware
    }

    /// Switch every controllable LED
    ///
    /// Fails with `NotAllowed` if LEDs exist but none is writable, and with
    /// `NotSupported` if there are no LEDs at all. A partial failure is
    /// logged but counts as success as long as one LED switched.
    pub fn set_torch(&self, on: bool) -> PlatformResult<()> {
        if self.devices.is_empty() {
            return Err(if self.unwritable.is_empty() {
                PlatformError::new(PlatformErrorCode::NotSupported, "no flash LED found")
            } else {
                PlatformError::new(
                    PlatformErrorCode::NotAllowed,
                    format!("flash LEDs not writable: {}", self.unwritable.join(", ")),
                )
            });
        }

        let mut switched = 0;
        let mut last_error = None;
        for dev in &self.devices {
            let result = if on { dev.torch(1.0) } else { dev.off() };
            match result {
                Ok(()) => switched += 1,
                Err(e) => {
                    warn!(device = %dev.name, error = %e, on, "Failed to switch flash LED");
                    last_error = Some(e);
                }
            }
        }

        match (switched, last_error) {
            (0, Some(e)) => Err(e.into()),
            _ => Ok(()),
        }
    }
}
