//! # Progress Store
//!
//! Durable checkpoints of the running sync and the archive of finished runs.
//!
//! ## Overview
//!
//! - At most one live checkpoint row exists (`sync_progress`, id 1). It is
//!   upserted after every page fetch and every reconciled item, and carries
//!   the unreconciled part of the current page as JSON so a resume never
//!   fetches that page again.
//! - Checkpoints that have been idle too long are treated as abandoned and
//!   deleted on load (30 minutes, or 4 hours for an explicit pause).
//! - A naturally completed run is copied into `sync_history`, which is
//!   append-only.

use crate::catalog::CatalogItem;
use crate::state::{SyncMode, SyncState};
use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROGRESS_ROW_ID: i64 = 1;

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);
const DEFAULT_PAUSED_MAX_AGE: Duration = Duration::from_secs(4 * 60 * 60);

// ============================================================================
// Domain Types
// ============================================================================

/// Status recorded on the live checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Running,
    Paused,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Running => "running",
            ProgressStatus::Paused => "paused",
            ProgressStatus::Completed => "completed",
        }
    }
}

impl FromStr for ProgressStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(ProgressStatus::Running),
            "paused" => Ok(ProgressStatus::Paused),
            "completed" => Ok(ProgressStatus::Completed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Live checkpoint of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub id: i64,
    pub mode: SyncMode,
    pub folder_id: i64,
    pub folder_name: String,
    pub folder_index: u32,
    pub total_folders: u32,
    pub current_page: u32,
    pub processed: u64,
    pub total: u64,
    pub status: ProgressStatus,
    /// JSON array of the unreconciled items of the current page
    pub last_batch: Option<String>,
    pub last_activity_at: i64,
    /// Run start
    pub created_at: i64,
    pub updated_at: i64,
}

impl SyncProgress {
    /// Capture `state` as a checkpoint.
    pub fn from_state(state: &SyncState, status: ProgressStatus, now: i64) -> Result<Self> {
        let last_batch = serde_json::to_string(&state.pending_batch)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        Ok(Self {
            id: PROGRESS_ROW_ID,
            mode: state.mode,
            folder_id: state.current_folder,
            folder_name: state.current_folder_name.clone(),
            folder_index: u32::try_from(state.folder_index).unwrap_or(u32::MAX),
            total_folders: u32::try_from(state.total_folders()).unwrap_or(u32::MAX),
            current_page: state.current_page,
            processed: state.processed,
            total: state.total,
            status,
            last_batch: Some(last_batch),
            last_activity_at: state.last_activity.unwrap_or(now),
            created_at: state.started_at.unwrap_or(now),
            updated_at: now,
        })
    }

    pub fn is_resumable(&self) -> bool {
        self.status != ProgressStatus::Completed
    }

    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.last_activity_at).max(0)
    }

    /// Decode the saved pending batch.
    ///
    /// A missing or corrupt batch restores as empty; the run then continues
    /// from the saved page cursor.
    pub fn restore_last_batch(&self) -> VecDeque<CatalogItem> {
        let Some(json) = self.last_batch.as_deref().filter(|json| !json.is_empty()) else {
            return VecDeque::new();
        };

        match serde_json::from_str::<VecDeque<CatalogItem>>(json) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Saved batch is corrupt, resuming without it");
                VecDeque::new()
            }
        }
    }

    /// Copy the checkpoint's position, counters and batch into `state`.
    ///
    /// Status, run id and folder list are left to the caller.
    pub fn restore_into(&self, state: &mut SyncState) {
        state.mode = self.mode;
        state.current_folder = self.folder_id;
        state.current_folder_name = self.folder_name.clone();
        state.folder_index = self.folder_index as usize;
        state.current_page = self.current_page.max(1);
        state.processed = self.processed;
        state.total = self.total;
        state.pending_batch = self.restore_last_batch();
        state.last_activity = Some(self.last_activity_at);
        state.started_at = Some(self.created_at);
    }
}

/// Archived summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHistory {
    pub id: i64,
    pub mode: SyncMode,
    pub folder_id: i64,
    pub folder_name: String,
    pub processed: u64,
    pub total: u64,
    pub duration_secs: i64,
    pub status: String,
    pub error_message: Option<String>,
    pub started_at: i64,
    pub completed_at: i64,
    pub created_at: i64,
}

// ============================================================================
// Store Trait
// ============================================================================

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Upsert the live checkpoint
    async fn save(&self, progress: &SyncProgress) -> Result<()>;

    /// Load the live checkpoint, deleting it instead when it is stale
    async fn load(&self) -> Result<Option<SyncProgress>>;

    /// Append a history row for a finished run
    async fn archive_to_history(
        &self,
        progress: &SyncProgress,
        completed_at: i64,
    ) -> Result<SyncHistory>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Remove any live checkpoint
    async fn clear(&self) -> Result<()>;

    /// Archived runs, most recent first
    async fn history(&self, limit: u32) -> Result<Vec<SyncHistory>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

pub struct SqliteProgressStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    paused_max_age: Duration,
}

impl SqliteProgressStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            max_age: DEFAULT_MAX_AGE,
            paused_max_age: DEFAULT_PAUSED_MAX_AGE,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration, paused_max_age: Duration) -> Self {
        self.max_age = max_age;
        self.paused_max_age = paused_max_age;
        self
    }

    fn is_stale(&self, progress: &SyncProgress, now: i64) -> bool {
        let limit = match progress.status {
            ProgressStatus::Paused => self.paused_max_age,
            _ => self.max_age,
        };
        progress.age_secs(now) > i64::try_from(limit.as_secs()).unwrap_or(i64::MAX)
    }
}

fn db_error(e: sqlx::Error) -> SyncError {
    SyncError::Database(e.to_string())
}

#[derive(Debug, FromRow)]
struct SyncProgressRow {
    id: i64,
    sync_mode: String,
    folder_id: i64,
    folder_name: String,
    folder_index: i64,
    total_folders: i64,
    current_page: i64,
    processed: i64,
    total_albums: i64,
    status: String,
    last_batch_json: Option<String>,
    last_activity_at: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SyncProgressRow> for SyncProgress {
    type Error = SyncError;

    fn try_from(row: SyncProgressRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            mode: SyncMode::from_str(&row.sync_mode)?,
            folder_id: row.folder_id,
            folder_name: row.folder_name,
            folder_index: to_u32(row.folder_index),
            total_folders: to_u32(row.total_folders),
            current_page: to_u32(row.current_page).max(1),
            processed: to_u64(row.processed),
            total: to_u64(row.total_albums),
            status: ProgressStatus::from_str(&row.status)?,
            last_batch: row.last_batch_json,
            last_activity_at: row.last_activity_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SyncHistoryRow {
    id: i64,
    sync_mode: String,
    folder_id: i64,
    folder_name: String,
    processed: i64,
    total_albums: i64,
    duration_secs: i64,
    status: String,
    error_message: Option<String>,
    started_at: i64,
    completed_at: i64,
    created_at: i64,
}

impl TryFrom<SyncHistoryRow> for SyncHistory {
    type Error = SyncError;

    fn try_from(row: SyncHistoryRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            mode: SyncMode::from_str(&row.sync_mode)?,
            folder_id: row.folder_id,
            folder_name: row.folder_name,
            processed: to_u64(row.processed),
            total: to_u64(row.total_albums),
            duration_secs: row.duration_secs,
            status: row.status,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn save(&self, progress: &SyncProgress) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_progress (
                id, sync_mode, folder_id, folder_name, folder_index, total_folders,
                current_page, processed, total_albums, status, last_batch_json,
                last_activity_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                sync_mode = excluded.sync_mode,
                folder_id = excluded.folder_id,
                folder_name = excluded.folder_name,
                folder_index = excluded.folder_index,
                total_folders = excluded.total_folders,
                current_page = excluded.current_page,
                processed = excluded.processed,
                total_albums = excluded.total_albums,
                status = excluded.status,
                last_batch_json = excluded.last_batch_json,
                last_activity_at = excluded.last_activity_at,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(progress.id)
        .bind(progress.mode.as_str())
        .bind(progress.folder_id)
        .bind(&progress.folder_name)
        .bind(i64::from(progress.folder_index))
        .bind(i64::from(progress.total_folders))
        .bind(i64::from(progress.current_page))
        .bind(to_i64(progress.processed))
        .bind(to_i64(progress.total))
        .bind(progress.status.as_str())
        .bind(&progress.last_batch)
        .bind(progress.last_activity_at)
        .bind(progress.created_at)
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!(
            processed = progress.processed,
            page = progress.current_page,
            status = %progress.status,
            "Progress checkpoint saved"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<SyncProgress>> {
        let row = sqlx::query_as::<_, SyncProgressRow>(
            r#"
            SELECT id, sync_mode, folder_id, folder_name, folder_index, total_folders,
                   current_page, processed, total_albums, status, last_batch_json,
                   last_activity_at, created_at, updated_at
            FROM sync_progress
            WHERE id = ?
            "#,
        )
        .bind(PROGRESS_ROW_ID)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let progress = match SyncProgress::try_from(row) {
            Ok(progress) => progress,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable progress checkpoint");
                self.delete(PROGRESS_ROW_ID).await?;
                return Ok(None);
            }
        };

        let now = self.clock.unix_timestamp();
        if self.is_stale(&progress, now) {
            info!(
                age_secs = progress.age_secs(now),
                status = %progress.status,
                "Discarding stale progress checkpoint"
            );
            self.delete(progress.id).await?;
            return Ok(None);
        }

        Ok(Some(progress))
    }

    async fn archive_to_history(
        &self,
        progress: &SyncProgress,
        completed_at: i64,
    ) -> Result<SyncHistory> {
        let now = self.clock.unix_timestamp();
        let duration_secs = (completed_at - progress.created_at).max(1);
        let status = ProgressStatus::Completed.as_str();

        let id = sqlx::query(
            r#"
            INSERT INTO sync_history (
                sync_mode, folder_id, folder_name, processed, total_albums,
                duration_secs, status, error_message, started_at, completed_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)
            "#,
        )
        .bind(progress.mode.as_str())
        .bind(progress.folder_id)
        .bind(&progress.folder_name)
        .bind(to_i64(progress.processed))
        .bind(to_i64(progress.total))
        .bind(duration_secs)
        .bind(status)
        .bind(progress.created_at)
        .bind(completed_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?
        .last_insert_rowid();

        info!(
            history_id = id,
            processed = progress.processed,
            duration_secs,
            "Sync run archived"
        );

        Ok(SyncHistory {
            id,
            mode: progress.mode,
            folder_id: progress.folder_id,
            folder_name: progress.folder_name.clone(),
            processed: progress.processed,
            total: progress.total,
            duration_secs,
            status: status.to_string(),
            error_message: None,
            started_at: progress.created_at,
            completed_at,
            created_at: now,
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM sync_progress WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM sync_progress")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn history(&self, limit: u32) -> Result<Vec<SyncHistory>> {
        let rows = sqlx::query_as::<_, SyncHistoryRow>(
            r#"
            SELECT id, sync_mode, folder_id, folder_name, processed, total_albums,
                   duration_secs, status, error_message, started_at, completed_at, created_at
            FROM sync_history
            ORDER BY completed_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(SyncHistory::try_from).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SyncStatus;
    use bridge_traits::time::ManualClock;
    use core_library::db::create_test_pool;

    const T0: i64 = 1_700_000_000;

    fn item(id: i64) -> CatalogItem {
        CatalogItem {
            external_id: id,
            instance_id: id * 10,
            title: format!("Album {}", id),
            artist: "Artist".to_string(),
            year: 1990,
            cover_url: None,
            folder_id: 4,
            date_added: None,
        }
    }

    fn running_state() -> SyncState {
        SyncState {
            status: SyncStatus::Running,
            mode: SyncMode::Folder,
            current_folder: 4,
            current_folder_name: "Vinyl".to_string(),
            current_page: 3,
            processed: 7,
            total: 20,
            pending_batch: VecDeque::from(vec![item(8), item(9)]),
            last_activity: Some(T0),
            started_at: Some(T0 - 60),
            ..SyncState::default()
        }
    }

    async fn setup_store() -> (SqliteProgressStore, Arc<ManualClock>) {
        let pool = create_test_pool().await.unwrap();
        let clock = Arc::new(ManualClock::at_unix(T0));
        (SqliteProgressStore::new(pool, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let (store, _clock) = setup_store().await;
        let progress = SyncProgress::from_state(&running_state(), ProgressStatus::Running, T0)
            .unwrap();

        store.save(&progress).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded, progress);
        assert_eq!(loaded.restore_last_batch(), VecDeque::from(vec![item(8), item(9)]));
    }

    #[tokio::test]
    async fn test_save_overwrites_single_row() {
        let (store, _clock) = setup_store().await;
        let mut state = running_state();

        let first = SyncProgress::from_state(&state, ProgressStatus::Running, T0).unwrap();
        store.save(&first).await.unwrap();

        state.complete_item(&item(8));
        let second = SyncProgress::from_state(&state, ProgressStatus::Running, T0).unwrap();
        store.save(&second).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.processed, 8);
        assert_eq!(loaded.restore_last_batch().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_running_progress_is_deleted() {
        let (store, clock) = setup_store().await;
        let progress = SyncProgress::from_state(&running_state(), ProgressStatus::Running, T0)
            .unwrap();
        store.save(&progress).await.unwrap();

        clock.advance(Duration::from_secs(31 * 60));
        assert!(store.load().await.unwrap().is_none());

        // Deleted, not just hidden
        clock.set(chrono::DateTime::from_timestamp(T0, 0).unwrap());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_paused_progress_tolerates_longer_idle() {
        let (store, clock) = setup_store().await;
        let progress = SyncProgress::from_state(&running_state(), ProgressStatus::Paused, T0)
            .unwrap();
        store.save(&progress).await.unwrap();

        clock.advance(Duration::from_secs(3 * 60 * 60));
        assert!(store.load().await.unwrap().is_some());

        clock.advance(Duration::from_secs(2 * 60 * 60));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_batch_restores_empty() {
        let (store, _clock) = setup_store().await;
        let mut progress =
            SyncProgress::from_state(&running_state(), ProgressStatus::Paused, T0).unwrap();
        progress.last_batch = Some("{not json".to_string());
        store.save(&progress).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.restore_last_batch().is_empty());

        let mut state = SyncState::default();
        loaded.restore_into(&mut state);
        assert_eq!(state.current_page, 3);
        assert_eq!(state.processed, 7);
        assert!(state.pending_batch.is_empty());
    }

    #[tokio::test]
    async fn test_archive_and_history_order() {
        let (store, _clock) = setup_store().await;
        let mut progress =
            SyncProgress::from_state(&running_state(), ProgressStatus::Completed, T0).unwrap();

        let first = store.archive_to_history(&progress, T0).await.unwrap();
        assert_eq!(first.duration_secs, 60);
        assert_eq!(first.status, "completed");

        progress.created_at = T0 + 100;
        let second = store.archive_to_history(&progress, T0 + 100).await.unwrap();
        assert_eq!(second.duration_secs, 1);

        let history = store.history(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
        assert_eq!(history[1].processed, 7);
        assert_eq!(history[1].mode, SyncMode::Folder);

        assert_eq!(store.history(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_removes_checkpoint() {
        let (store, _clock) = setup_store().await;
        let progress = SyncProgress::from_state(&running_state(), ProgressStatus::Running, T0)
            .unwrap();
        store.save(&progress).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
