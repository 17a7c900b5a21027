// SPDX-License-Identifier: GPL-3.0-only

//! Success feedback for terminal sessions

use crate::config::Preferences;
use crate::scan::FeedbackNotifier;
use std::io::Write;
use tracing::debug;

/// Rings the terminal bell on success
///
/// Terminals cannot vibrate; the vibration cue is only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalFeedback;

impl FeedbackNotifier for TerminalFeedback {
    fn on_success(&self, preferences: &Preferences) {
        if preferences.sound_enabled {
            let mut stderr = std::io::stderr();
            if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
                debug!(error = %e, "Failed to ring terminal bell");
            }
        }
        if preferences.vibration_enabled {
            debug!("Vibration requested, not available in a terminal");
        }
    }
}
