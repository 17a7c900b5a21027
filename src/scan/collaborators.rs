// SPDX-License-Identifier: GPL-3.0-only

//! Interfaces the scan session consumes
//!
//! The controller reports results and feedback through these traits and
//! never learns where they go.

use crate::config::Preferences;
use crate::payload::PayloadKind;
use std::sync::Arc;
use tracing::error;

/// Receives successful scans for persistence
pub trait ResultSink: Send + Sync {
    /// Record decoded `content`. `generated` is false for scanned codes.
    fn record(&self, content: &str, kind: PayloadKind, generated: bool);
}

/// Plays the success cue
pub trait FeedbackNotifier: Send + Sync {
    /// Called once per successful scan with the current preferences
    fn on_success(&self, preferences: &Preferences);
}

/// Read-only view of the user's preferences
pub trait PreferenceSource: Send + Sync {
    fn preferences(&self) -> Preferences;
}

/// Opens URL results
pub trait UrlOpener: Send + Sync {
    fn open_url(&self, url: &str);
}

impl PreferenceSource for Preferences {
    fn preferences(&self) -> Preferences {
        *self
    }
}

/// Opens URLs with the desktop's default handler
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUrlOpener;

impl UrlOpener for SystemUrlOpener {
    fn open_url(&self, url: &str) {
        if let Err(err) = open::that_detached(url) {
            error!(url = %url, error = %err, "Failed to open URL");
        }
    }
}

/// Everything the controller hands results to
#[derive(Clone)]
pub struct Collaborators {
    pub sink: Arc<dyn ResultSink>,
    pub feedback: Arc<dyn FeedbackNotifier>,
    pub preferences: Arc<dyn PreferenceSource>,
    pub opener: Arc<dyn UrlOpener>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
