// SPDX-License-Identifier: GPL-3.0-only

//! Scan history
//!
//! Every recorded code is kept in a JSON file under the user's data
//! directory, newest first. The store is the scan session's result sink;
//! write failures are logged and never reach the session.

use crate::constants;
use crate::errors::{AppError, AppResult};
use crate::payload::PayloadKind;
use crate::scan::ResultSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};
use uuid::Uuid;

/// A recorded code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
    /// True for codes the user generated rather than scanned
    #[serde(default)]
    pub generated: bool,
}

/// JSON-backed history list
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    items: Mutex<Vec<HistoryItem>>,
}

impl HistoryStore {
    /// Default history file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join(constants::APP_ID).join(constants::HISTORY_FILE))
    }

    /// Open the history at the default location
    pub fn open_default() -> AppResult<Self> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Storage("no data directory available".to_string()))?;
        Self::open(path)
    }

    /// Open the history file at `path`; a missing file is an empty history
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let items = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                AppError::Storage(format!("corrupt history {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let store = Self {
            path,
            items: Mutex::new(items),
        };
        debug!(path = %store.path.display(), count = store.len(), "History loaded");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn items_mut(&self) -> MutexGuard<'_, Vec<HistoryItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All items, newest first
    pub fn items(&self) -> Vec<HistoryItem> {
        self.items_mut().clone()
    }

    pub fn len(&self) -> usize {
        self.items_mut().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items_mut().is_empty()
    }

    /// Prepend a new item and persist
    pub fn add(&self, content: &str, kind: PayloadKind, generated: bool) -> AppResult<HistoryItem> {
        let item = HistoryItem {
            id: Uuid::new_v4(),
            kind,
            content: content.to_string(),
            timestamp: Utc::now(),
            is_favorite: false,
            generated,
        };

        let mut items = self.items_mut();
        items.insert(0, item.clone());
        self.save(&items)?;
        info!(id = %item.id, kind = %kind, "Added history item");
        Ok(item)
    }

    /// Flip the favorite flag; returns the new value, `None` for unknown ids
    pub fn toggle_favorite(&self, id: Uuid) -> AppResult<Option<bool>> {
        let mut items = self.items_mut();
        let Some(item) = items.iter_mut().find(|item| item.id == id) else {
            return Ok(None);
        };
        item.is_favorite = !item.is_favorite;
        let favorite = item.is_favorite;
        self.save(&items)?;
        Ok(Some(favorite))
    }

    /// Remove the given items; returns how many were removed
    pub fn delete(&self, ids: &[Uuid]) -> AppResult<usize> {
        let mut items = self.items_mut();
        let before = items.len();
        items.retain(|item| !ids.contains(&item.id));
        let removed = before - items.len();
        if removed > 0 {
            self.save(&items)?;
        }
        Ok(removed)
    }

    /// Remove everything
    pub fn clear(&self) -> AppResult<()> {
        let mut items = self.items_mut();
        items.clear();
        self.save(&items)?;
        info!("History cleared");
        Ok(())
    }

    fn save(&self, items: &[HistoryItem]) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(items)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl ResultSink for HistoryStore {
    fn record(&self, content: &str, kind: PayloadKind, generated: bool) {
        if let Err(e) = self.add(content, kind, generated) {
            error!(error = %e, path = %self.path.display(), "Failed to record scan in history");
        }
    }
}
