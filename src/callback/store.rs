// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON file storage for callback state.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
#[cfg(feature = "telemetry")]
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::types::{Callback, CallbackGroup, CallbackStatus};

/// File name used inside the state directory.
pub const STORE_FILE_NAME: &str = "callbacks.json";

/// Maximum retained finished callbacks.
pub const CALLBACK_HISTORY_LIMIT: usize = 100;

/// Maximum retained finished groups.
pub const GROUP_HISTORY_LIMIT: usize = 50;

/// Everything the registry tracks, in the shape it is written to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Active callbacks keyed by agent id.
    #[serde(default)]
    pub callbacks: HashMap<String, Callback>,
    /// Active groups keyed by group id.
    #[serde(default)]
    pub groups: HashMap<String, CallbackGroup>,
    /// Finished callbacks, oldest first.
    #[serde(default)]
    pub history: VecDeque<Callback>,
    #[serde(default)]
    pub group_history: VecDeque<CallbackGroup>,
}

impl StoreSnapshot {
    /// Repair state written by an interrupted process.
    ///
    /// Anything caught mid-dispatch goes back to pending so it can be
    /// retried, and history is trimmed to its caps. A group keeps its
    /// recorded results, so a restored group may already be ready; see
    /// [`CallbackRegistry::resume_interrupted`](super::CallbackRegistry::resume_interrupted).
    pub fn normalize(&mut self) {
        for callback in self.callbacks.values_mut() {
            if callback.status == CallbackStatus::Dispatching {
                callback.status = CallbackStatus::Pending;
            }
        }
        for group in self.groups.values_mut() {
            if group.status == CallbackStatus::Dispatching {
                group.status = CallbackStatus::Pending;
            }
        }
        trim_front(&mut self.history, CALLBACK_HISTORY_LIMIT);
        trim_front(&mut self.group_history, GROUP_HISTORY_LIMIT);
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
            && self.groups.is_empty()
            && self.history.is_empty()
            && self.group_history.is_empty()
    }
}

/// Append to a bounded history, evicting the oldest entries.
pub(crate) fn push_bounded<T>(history: &mut VecDeque<T>, item: T, limit: usize) {
    history.push_back(item);
    trim_front(history, limit);
}

fn trim_front<T>(history: &mut VecDeque<T>, limit: usize) {
    while history.len() > limit {
        history.pop_front();
    }
}

/// Reads and writes the callback state file.
#[derive(Debug, Clone)]
pub struct CallbackStore {
    path: PathBuf,
}

impl CallbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<state_dir>/callbacks.json`.
    pub fn in_dir(state_dir: impl AsRef<Path>) -> Self {
        Self::new(state_dir.as_ref().join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved state. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<StoreSnapshot>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::LoadFailed(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let mut snapshot: StoreSnapshot = serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupted(format!("{}: {}", self.path.display(), e)))?;
        snapshot.normalize();

        debug!(
            path = %self.path.display(),
            active = snapshot.callbacks.len(),
            groups = snapshot.groups.len(),
            "Loaded callback state"
        );
        Ok(Some(snapshot))
    }

    /// Write the full state, replacing the previous file atomically.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::SaveFailed(format!("Failed to create state directory: {}", e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StoreError::SaveFailed(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("store.save", start.elapsed());

        Ok(())
    }
}
