// SPDX-License-Identifier: GPL-3.0-only

//! Persistent configuration
//!
//! User preferences and scan tuning, stored as JSON under the user's config
//! directory. Missing fields fall back to their defaults so older files keep
//! loading after new settings are added.

use crate::constants::{self, frames, timing};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// User preferences consumed read-only by the scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Play a sound when a code is recognised
    pub sound_enabled: bool,
    /// Vibrate when a code is recognised
    pub vibration_enabled: bool,
    /// Open URL results immediately after recording them
    pub auto_open: bool,
    /// Keep scanning after each result
    pub batch_mode: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            vibration_enabled: true,
            auto_open: false,
            batch_mode: false,
        }
    }
}

/// What the front end shows after a successful scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AfterScan {
    /// Dedicated result view for the scanned payload
    #[default]
    ShowResult,
    /// Jump to the history list
    ShowHistory,
}

/// Scan session tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Bound on waiting for the camera view, in milliseconds
    pub surface_timeout_ms: u64,
    /// Decode attempts per second
    pub decode_fps: u32,
    /// Longest frame side fed to the decoder
    pub max_decode_dimension: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            surface_timeout_ms: timing::SURFACE_READY_TIMEOUT.as_millis() as u64,
            decode_fps: timing::DECODE_FPS,
            max_decode_dimension: frames::MAX_DECODE_DIMENSION,
        }
    }
}

impl ScanConfig {
    /// Surface readiness timeout
    pub fn surface_timeout(&self) -> Duration {
        Duration::from_millis(self.surface_timeout_ms)
    }

    /// Interval between decode attempts
    pub fn decode_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.decode_fps.max(1)))
    }
}

/// Explicit device choice per facing mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Device used for the environment (rear) facing
    pub environment_device: Option<PathBuf>,
    /// Device used for the user (front) facing
    pub user_device: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// User preferences
    pub preferences: Preferences,
    /// Navigation after a successful scan
    pub after_scan: AfterScan,
    /// Scan session tuning
    pub scan: ScanConfig,
    /// Device overrides
    pub camera: CameraSettings,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(constants::APP_ID).join(constants::CONFIG_FILE))
    }

    /// Load the config from the default location, or defaults if there is none
    pub fn load() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load the config from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write the config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }
}
