//! # Sync State
//!
//! Process-wide state of the collection sync and its single accessor.
//!
//! ## State Machine
//!
//! ```text
//! Idle ──start──▶ Running ──pause──▶ Paused
//!  ▲                │  ▲               │
//!  │                │  └────resume─────┘
//!  └─cancel/finish──┴──────cancel──────┘
//! ```
//!
//! The coordinator and the worker share one [`SyncStateManager`]. Every read
//! and write goes through it; the worker additionally tags its writes with the
//! [`RunId`] it was spawned for, so a worker left over from a cancelled run
//! can never overwrite a newer one.

use crate::catalog::{CatalogFolder, CatalogItem};
use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Identifies one Start/Resume of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Running,
    Paused,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Running => "running",
            SyncStatus::Paused => "paused",
        }
    }

    /// Any state may be forced back to `Idle`.
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (_, SyncStatus::Idle)
                | (SyncStatus::Idle, SyncStatus::Running)
                | (SyncStatus::Running, SyncStatus::Paused)
                | (SyncStatus::Paused, SyncStatus::Running)
        )
    }

    pub fn validate_transition(&self, next: SyncStatus) -> Result<()> {
        if self.can_transition_to(next) {
            return Ok(());
        }

        let reason = match (self, next) {
            (SyncStatus::Running, SyncStatus::Running) => "a sync is already running",
            (SyncStatus::Paused, SyncStatus::Paused) => "sync is already paused",
            (SyncStatus::Idle, SyncStatus::Paused) => "only a running sync can be paused",
            _ => "transition not allowed",
        };

        Err(SyncError::InvalidStateTransition {
            from: self.as_str().to_string(),
            to: next.as_str().to_string(),
            reason: reason.to_string(),
        })
    }
}

impl FromStr for SyncStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SyncStatus::Idle),
            "running" => Ok(SyncStatus::Running),
            "paused" => Ok(SyncStatus::Paused),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What part of the collection a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    /// Every folder, one after another
    #[default]
    #[serde(rename = "all-folders")]
    AllFolders,
    /// A single folder chosen by the user
    #[serde(rename = "specific")]
    Folder,
    /// The unfoldered collection listing
    #[serde(rename = "collection")]
    Collection,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::AllFolders => "all-folders",
            SyncMode::Folder => "specific",
            SyncMode::Collection => "collection",
        }
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all-folders" => Ok(SyncMode::AllFolders),
            "specific" => Ok(SyncMode::Folder),
            "collection" => Ok(SyncMode::Collection),
            _ => Err(SyncError::InvalidSyncMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub status: SyncStatus,
    pub mode: SyncMode,
    /// Run that currently owns the state
    pub run_id: Option<RunId>,
    pub username: String,
    /// Resolved folder list (all-folders mode only)
    pub folders: Vec<CatalogFolder>,
    pub folder_index: usize,
    pub current_folder: i64,
    pub current_folder_name: String,
    /// Next page to fetch once the pending batch is drained
    pub current_page: u32,
    pub processed: u64,
    pub total: u64,
    /// Fetched items not yet reconciled, in catalog order
    pub pending_batch: VecDeque<CatalogItem>,
    pub api_remaining: Option<u32>,
    pub last_activity: Option<i64>,
    pub started_at: Option<i64>,
    pub last_error: Option<String>,
}

impl SyncState {
    pub fn is_running(&self) -> bool {
        self.status == SyncStatus::Running
    }

    pub fn is_paused(&self) -> bool {
        self.status == SyncStatus::Paused
    }

    pub fn total_folders(&self) -> usize {
        self.folders.len()
    }

    pub fn has_more_folders(&self) -> bool {
        self.mode == SyncMode::AllFolders && self.folder_index + 1 < self.folders.len()
    }

    /// Move to the next folder and rewind the page cursor.
    ///
    /// Returns `false` when no folder is left.
    pub fn advance_folder(&mut self) -> bool {
        if !self.has_more_folders() {
            return false;
        }

        self.folder_index += 1;
        if let Some(folder) = self.folders.get(self.folder_index) {
            self.current_folder = folder.id;
            self.current_folder_name = folder.name.clone();
        }
        self.current_page = 1;
        true
    }

    /// Record one reconciled item: count it and drop it from the batch.
    ///
    /// Only pops when the front of the batch is still `item`.
    pub fn complete_item(&mut self, item: &CatalogItem) -> bool {
        if self.pending_batch.front() != Some(item) {
            return false;
        }

        self.pending_batch.pop_front();
        self.processed += 1;
        true
    }

    /// Drop everything back to an idle, empty state.
    pub fn reset(&mut self) {
        *self = SyncState::default();
    }
}

/// Owner of the shared [`SyncState`]
#[derive(Debug, Default)]
pub struct SyncStateManager {
    state: RwLock<SyncState>,
    /// Serializes progress writes against Pause and Cancel
    checkpoint: Mutex<()>,
}

impl SyncStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> SyncState {
        self.state.read().await.clone()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&SyncState) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    pub async fn update<R>(&self, f: impl FnOnce(&mut SyncState) -> R) -> R {
        let mut state = self.state.write().await;
        f(&mut state)
    }

    /// Apply `f` only while `run_id` still owns the state.
    pub async fn update_run<R>(
        &self,
        run_id: RunId,
        f: impl FnOnce(&mut SyncState) -> R,
    ) -> Option<R> {
        let mut state = self.state.write().await;
        if state.run_id != Some(run_id) {
            return None;
        }
        Some(f(&mut state))
    }

    pub async fn read_run<R>(&self, run_id: RunId, f: impl FnOnce(&SyncState) -> R) -> Option<R> {
        let state = self.state.read().await;
        if state.run_id != Some(run_id) {
            return None;
        }
        Some(f(&state))
    }

    pub async fn status(&self) -> SyncStatus {
        self.state.read().await.status
    }

    /// Validated status change
    pub async fn transition(&self, next: SyncStatus) -> Result<SyncStatus> {
        let mut state = self.state.write().await;
        let previous = state.status;
        previous.validate_transition(next)?;
        state.status = next;
        Ok(previous)
    }

    pub async fn checkpoint_guard(&self) -> MutexGuard<'_, ()> {
        self.checkpoint.lock().await
    }
}

// ============================================================================
// Tests
// ============================================================================
