//! # Sync Coordinator
//!
//! Control surface of the collection sync.
//!
//! ## Overview
//!
//! The `SyncCoordinator` owns the process-wide [`SyncStateManager`] and the
//! single background worker. It exposes the operations a host wires to its
//! control endpoints:
//!
//! - `start`: begin a run, or hand back a resumable offer when a fresh
//!   checkpoint from an earlier run exists
//! - `pause` / `resume_from_pause`: suspend and continue the live run
//! - `resume`: continue from the saved checkpoint, e.g. after a restart
//! - `cancel`: stop everything and drop the checkpoint
//! - `progress` / `history`: observe the current and past runs
//!
//! ## Workflow
//!
//! 1. Verify credentials and resolve the catalog username
//! 2. Resolve the folder list (all-folders mode)
//! 3. Fetch page 1 so an early failure reaches the caller
//! 4. Seed the state, write the first checkpoint and spawn the worker
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{StartOutcome, StartRequest, SyncCoordinator};
//!
//! match coordinator.start(StartRequest::all_folders()).await? {
//!     StartOutcome::ResumeAvailable(offer) => {
//!         println!("{} of {} done, resuming", offer.processed, offer.total);
//!         coordinator.resume().await?;
//!     }
//!     outcome => println!("{:?}", outcome),
//! }
//!
//! let snapshot = coordinator.progress().await;
//! println!("{}/{} stalled={}", snapshot.processed, snapshot.total, snapshot.is_stalled);
//! ```

use crate::catalog::{CatalogClient, CatalogError, CatalogFolder, CollectionPage, ALL_FOLDER_ID};
use crate::config::SyncConfig;
use crate::progress::{ProgressStatus, ProgressStore, SyncHistory, SyncProgress};
use crate::rate_limiter::{RateLimitStatus, RateLimiter, RequestClass};
use crate::reconciler::Reconciler;
use crate::state::{RunId, SyncMode, SyncState, SyncStateManager, SyncStatus};
use crate::worker::{SyncContext, SyncWorker};
use crate::{Result, SyncError};
use bridge_traits::time::Clock;
use core_library::{AlbumRepository, SettingsRepository, SyncLogRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Collaborators the coordinator is built from
#[derive(Clone)]
pub struct SyncDependencies {
    pub catalog: Arc<dyn CatalogClient>,
    pub rate_limiter: Arc<RateLimiter>,
    pub progress: Arc<dyn ProgressStore>,
    pub albums: Arc<dyn AlbumRepository>,
    pub sync_log: Arc<dyn SyncLogRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub clock: Arc<dyn Clock>,
}

/// Parameters of a start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(rename = "sync_mode")]
    pub mode: SyncMode,
    /// Required for [`SyncMode::Folder`]
    #[serde(default)]
    pub folder_id: Option<i64>,
    /// Discard any saved checkpoint instead of offering it
    #[serde(default)]
    pub force_new: bool,
}

impl StartRequest {
    pub fn all_folders() -> Self {
        Self {
            mode: SyncMode::AllFolders,
            folder_id: None,
            force_new: false,
        }
    }

    pub fn folder(folder_id: i64) -> Self {
        Self {
            mode: SyncMode::Folder,
            folder_id: Some(folder_id),
            force_new: false,
        }
    }

    pub fn collection() -> Self {
        Self {
            mode: SyncMode::Collection,
            folder_id: None,
            force_new: false,
        }
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }
}

/// Summary of a saved checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedProgress {
    pub mode: SyncMode,
    pub folder_id: i64,
    pub folder_name: String,
    pub folder_index: u32,
    pub total_folders: u32,
    pub current_page: u32,
    pub processed: u64,
    pub total: u64,
    pub status: ProgressStatus,
    pub pending_items: usize,
    pub last_activity_at: i64,
    pub age_secs: i64,
}

impl SavedProgress {
    fn from_progress(progress: &SyncProgress, now: i64) -> Self {
        Self {
            mode: progress.mode,
            folder_id: progress.folder_id,
            folder_name: progress.folder_name.clone(),
            folder_index: progress.folder_index,
            total_folders: progress.total_folders,
            current_page: progress.current_page,
            processed: progress.processed,
            total: progress.total,
            status: progress.status,
            pending_items: progress.restore_last_batch().len(),
            last_activity_at: progress.last_activity_at,
            age_secs: progress.age_secs(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { run_id: RunId },
    /// Start found the run paused and continued it
    Resumed { run_id: RunId },
    /// An unfinished run was saved; call `resume` or start with `force_new`
    ResumeAvailable(SavedProgress),
}

/// Everything the progress endpoint reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: SyncStatus,
    pub is_running: bool,
    pub is_paused: bool,
    pub mode: SyncMode,
    pub folder_id: i64,
    pub folder_name: String,
    pub folder_index: usize,
    pub total_folders: usize,
    pub current_page: u32,
    pub processed: u64,
    pub total: u64,
    pub pending_items: usize,
    pub api_remaining: Option<u32>,
    pub rate_limit: RateLimitStatus,
    pub is_rate_limited: bool,
    pub rate_limit_seconds_left: Option<u64>,
    /// Running, not rate limited, and silent past the stall threshold
    pub is_stalled: bool,
    pub seconds_since_activity: Option<i64>,
    pub last_error: Option<String>,
    /// `None` when nothing is saved or the store did not answer in time
    pub saved: Option<SavedProgress>,
}

struct ActiveRun {
    run_id: RunId,
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SyncCoordinator {
    ctx: SyncContext,

    /// Catalog username; resolved through the identity endpoint when unset
    username: RwLock<Option<String>>,

    /// Worker of the current run
    active_run: Arc<Mutex<Option<ActiveRun>>>,

    /// Serializes start, pause, resume and cancel
    control: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig, deps: SyncDependencies) -> Self {
        let reconciler = Reconciler::new(
            deps.albums,
            deps.sync_log,
            Arc::clone(&deps.catalog),
            Arc::clone(&deps.clock),
            config.clone(),
        );

        let ctx = SyncContext {
            config,
            state: Arc::new(SyncStateManager::new()),
            catalog: deps.catalog,
            rate_limiter: deps.rate_limiter,
            progress: deps.progress,
            settings: deps.settings,
            reconciler: Arc::new(reconciler),
            clock: deps.clock,
        };

        Self {
            ctx,
            username: RwLock::new(None),
            active_run: Arc::new(Mutex::new(None)),
            control: Mutex::new(()),
        }
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = RwLock::new(username.filter(|name| !name.trim().is_empty()));
        self
    }

    pub fn state(&self) -> Arc<SyncStateManager> {
        Arc::clone(&self.ctx.state)
    }

    pub async fn status(&self) -> SyncStatus {
        self.ctx.state.status().await
    }

    /// Start a run.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyRunning`] while a run is active
    /// - [`SyncError::Configuration`] without catalog credentials
    /// - [`SyncError::InvalidInput`] for folder mode without a folder id
    /// - [`SyncError::PageFetch`] when the first page cannot be fetched
    #[instrument(skip(self), fields(mode = %request.mode))]
    pub async fn start(&self, request: StartRequest) -> Result<StartOutcome> {
        let _control = self.control.lock().await;

        match self.ctx.state.status().await {
            SyncStatus::Running => return Err(SyncError::AlreadyRunning),
            SyncStatus::Paused => {
                info!("Start requested while paused, resuming");
                let run_id = self.resume_paused().await?;
                return Ok(StartOutcome::Resumed { run_id });
            }
            SyncStatus::Idle => {}
        }

        self.ensure_authenticated()?;

        let folder_id = match request.mode {
            SyncMode::Folder => Some(request.folder_id.ok_or_else(|| SyncError::InvalidInput {
                field: "folder_id".to_string(),
                message: "A folder id is required for a specific-folder sync".to_string(),
            })?),
            SyncMode::AllFolders | SyncMode::Collection => None,
        };

        {
            // A finishing worker archives under this guard after it goes idle
            let _guard = self.ctx.state.checkpoint_guard().await;
            if request.force_new {
                self.ctx.progress.clear().await?;
                info!("Discarded saved progress for a fresh start");
            } else if let Some(offer) = self.check_saved_progress().await {
                info!(processed = offer.processed, "Unfinished sync found, offering resume");
                return Ok(StartOutcome::ResumeAvailable(offer));
            }
        }

        let username = self.resolve_username().await?;
        let (folders, current_folder, folder_name, folder_total) = self
            .resolve_folders(request.mode, folder_id, &username)
            .await?;

        self.ctx.rate_limiter.wait(RequestClass::Authenticated).await;
        let per_page = self.ctx.config.batch_size;
        let first = match request.mode {
            SyncMode::Collection => {
                self.ctx
                    .catalog
                    .get_user_collection(&username, 1, per_page)
                    .await
            }
            SyncMode::AllFolders | SyncMode::Folder => {
                self.ctx
                    .catalog
                    .get_user_collection_by_folder(&username, current_folder, 1, per_page)
                    .await
            }
        };
        let first = match first {
            Ok(page) => page,
            Err(CatalogError::PageOutOfRange { .. }) => CollectionPage::default(),
            Err(source) => {
                return Err(SyncError::PageFetch {
                    folder_id: current_folder,
                    page: 1,
                    source,
                })
            }
        };

        let total = match request.mode {
            SyncMode::AllFolders if folder_total > 0 => folder_total,
            _ if first.total_items > 0 => first.total_items,
            _ => folder_total,
        };

        let run_id = RunId::new();
        let now = self.ctx.clock.unix_timestamp();
        let api_remaining = self.ctx.rate_limiter.status().await.auth_remaining;
        let first_items = first.items.len();

        self.ctx
            .state
            .update(|s| {
                *s = SyncState {
                    status: SyncStatus::Running,
                    mode: request.mode,
                    run_id: Some(run_id),
                    username,
                    folders,
                    folder_index: 0,
                    current_folder,
                    current_folder_name: folder_name,
                    current_page: 2,
                    processed: 0,
                    total,
                    pending_batch: first.items.into(),
                    api_remaining: Some(api_remaining),
                    last_activity: Some(now),
                    started_at: Some(now),
                    last_error: None,
                };
            })
            .await;

        if let Err(e) = self
            .ctx
            .settings
            .record_sync_selection(request.mode.as_str(), folder_id.unwrap_or(0), now)
            .await
        {
            warn!(error = %e, "Failed to record sync selection");
        }

        self.ctx.checkpoint(run_id).await;
        self.spawn_worker(run_id).await;

        info!(
            run_id = %run_id,
            folder_id = current_folder,
            total,
            first_page_items = first_items,
            "Sync started"
        );

        Ok(StartOutcome::Started { run_id })
    }

    /// Suspend the running sync.
    ///
    /// The checkpoint, pending batch included, is written before the status
    /// flips, so nothing is lost if the process dies right after.
    #[instrument(skip(self))]
    pub async fn pause(&self) -> Result<()> {
        let _control = self.control.lock().await;
        let _guard = self.ctx.state.checkpoint_guard().await;

        let snapshot = self.ctx.state.snapshot().await;
        if !snapshot.is_running() {
            return Err(SyncError::NotRunning);
        }

        let now = self.ctx.clock.unix_timestamp();
        let saved = match SyncProgress::from_state(&snapshot, ProgressStatus::Paused, now) {
            Ok(progress) => self.ctx.progress.save(&progress).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!(error = %e, "Failed to save progress before pausing");
        }

        self.ctx.state.transition(SyncStatus::Paused).await?;
        self.ctx
            .state
            .update(|s| s.last_activity = Some(now))
            .await;

        info!(
            processed = snapshot.processed,
            pending = snapshot.pending_batch.len(),
            "Sync paused"
        );
        Ok(())
    }

    /// Continue a paused run.
    ///
    /// The live worker picks up where it stopped; if it is gone, the run is
    /// restored from its checkpoint and a new worker is spawned.
    #[instrument(skip(self))]
    pub async fn resume_from_pause(&self) -> Result<RunId> {
        let _control = self.control.lock().await;
        self.resume_paused().await
    }

    /// Continue from the saved checkpoint, or the paused run if there is one.
    ///
    /// This is how a run interrupted by a restart, or offered back by
    /// `start`, is picked up again.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> Result<RunId> {
        let _control = self.control.lock().await;

        match self.ctx.state.status().await {
            SyncStatus::Running => Err(SyncError::AlreadyRunning),
            SyncStatus::Paused => self.resume_paused().await,
            SyncStatus::Idle => self.restore_and_spawn().await,
        }
    }

    /// Stop any run and drop its checkpoint. Nothing is archived.
    #[instrument(skip(self))]
    pub async fn cancel(&self) -> Result<()> {
        let _control = self.control.lock().await;

        if let Some(active) = self.active_run.lock().await.take() {
            active.cancellation_token.cancel();
        }

        let _guard = self.ctx.state.checkpoint_guard().await;
        let (previous, processed) = self
            .ctx
            .state
            .update(|s| {
                let previous = (s.status, s.processed);
                s.reset();
                previous
            })
            .await;

        self.ctx.progress.clear().await?;

        info!(previous = %previous, processed, "Sync cancelled");
        Ok(())
    }

    /// Current run state plus the saved checkpoint.
    ///
    /// The checkpoint read is bounded by `progress_query_timeout`; when the
    /// store is slow the snapshot carries in-memory state only.
    pub async fn progress(&self) -> ProgressSnapshot {
        let state = self.ctx.state.snapshot().await;
        let rate_limit = self.ctx.rate_limiter.status().await;
        let now = self.ctx.clock.unix_timestamp();

        let saved = match tokio::time::timeout(
            self.ctx.config.progress_query_timeout,
            self.ctx.progress.load(),
        )
        .await
        {
            Ok(Ok(progress)) => progress.map(|p| SavedProgress::from_progress(&p, now)),
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read saved progress");
                None
            }
            Err(_) => {
                debug!("Saved progress query timed out, reporting in-memory state");
                None
            }
        };

        let seconds_since_activity = state.last_activity.map(|at| (now - at).max(0));
        let stall_secs = i64::try_from(self.ctx.config.stall_threshold.as_secs()).unwrap_or(i64::MAX);
        let is_stalled = state.is_running()
            && !rate_limit.is_rate_limited
            && seconds_since_activity.is_some_and(|secs| secs > stall_secs);

        ProgressSnapshot {
            status: state.status,
            is_running: state.is_running(),
            is_paused: state.is_paused(),
            mode: state.mode,
            folder_id: state.current_folder,
            folder_name: state.current_folder_name.clone(),
            folder_index: state.folder_index,
            total_folders: state.total_folders(),
            current_page: state.current_page,
            processed: state.processed,
            total: state.total,
            pending_items: state.pending_batch.len(),
            api_remaining: state.api_remaining,
            is_rate_limited: rate_limit.is_rate_limited,
            rate_limit_seconds_left: rate_limit
                .is_rate_limited
                .then_some(rate_limit.seconds_until_reset),
            rate_limit,
            is_stalled,
            seconds_since_activity,
            last_error: state.last_error,
            saved,
        }
    }

    /// Archived runs, most recent first
    pub async fn history(&self, limit: u32) -> Result<Vec<SyncHistory>> {
        self.ctx.progress.history(limit).await
    }

    /// Delete the saved checkpoint without touching a live run.
    pub async fn clear_progress(&self) -> Result<()> {
        self.ctx.progress.clear().await?;
        info!("Saved sync progress cleared");
        Ok(())
    }

    pub async fn is_sync_active(&self) -> bool {
        self.active_run
            .lock()
            .await
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.ctx.catalog.is_authenticated() {
            return Ok(());
        }
        Err(SyncError::Configuration(
            "Catalog credentials are not configured".to_string(),
        ))
    }

    async fn resolve_username(&self) -> Result<String> {
        if let Some(username) = self.username.read().await.clone() {
            return Ok(username);
        }

        let username = match self.ctx.catalog.get_identity().await {
            Ok(username) if !username.trim().is_empty() => username,
            Ok(_) => {
                return Err(SyncError::Configuration(
                    "Catalog identity returned no username".to_string(),
                ))
            }
            Err(CatalogError::Unauthorized(message)) => {
                return Err(SyncError::Configuration(format!(
                    "Catalog credentials were rejected: {}",
                    message
                )))
            }
            Err(e) => return Err(e.into()),
        };

        info!(username = %username, "Resolved catalog username");
        *self.username.write().await = Some(username.clone());
        Ok(username)
    }

    /// Folder list, first folder id and name, and the item count to report.
    async fn resolve_folders(
        &self,
        mode: SyncMode,
        folder_id: Option<i64>,
        username: &str,
    ) -> Result<(Vec<CatalogFolder>, i64, String, u64)> {
        match mode {
            SyncMode::AllFolders => {
                let folders = self.ctx.catalog.get_user_folders(username).await?;
                let total = folders
                    .iter()
                    .filter(|f| f.id != ALL_FOLDER_ID)
                    .map(|f| f.count)
                    .sum();
                let (id, name) = folders
                    .first()
                    .map(|f| (f.id, f.name.clone()))
                    .unwrap_or_default();
                info!(folders = folders.len(), total, "Resolved collection folders");
                Ok((folders, id, name, total))
            }
            SyncMode::Folder => {
                let id = folder_id.unwrap_or_default();
                let folder = match self.ctx.catalog.get_user_folders(username).await {
                    Ok(folders) => folders.into_iter().find(|f| f.id == id),
                    Err(e) => {
                        warn!(error = %e, folder_id = id, "Could not look up folder name");
                        None
                    }
                };
                let (name, count) = folder.map(|f| (f.name, f.count)).unwrap_or_default();
                Ok((Vec::new(), id, name, count))
            }
            SyncMode::Collection => Ok((Vec::new(), 0, String::new(), 0)),
        }
    }

    /// Fresh unfinished checkpoint to offer back, archiving a completed one.
    async fn check_saved_progress(&self) -> Option<SavedProgress> {
        let progress = match self.ctx.progress.load().await {
            Ok(Some(progress)) => progress,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read saved progress, starting fresh");
                return None;
            }
        };

        if progress.is_resumable() {
            return Some(SavedProgress::from_progress(
                &progress,
                self.ctx.clock.unix_timestamp(),
            ));
        }

        self.archive_completed(&progress).await;
        None
    }

    async fn archive_completed(&self, progress: &SyncProgress) {
        info!(processed = progress.processed, "Archiving completed run left in progress");
        match self
            .ctx
            .progress
            .archive_to_history(progress, progress.last_activity_at)
            .await
        {
            Ok(_) => {
                if let Err(e) = self.ctx.progress.delete(progress.id).await {
                    warn!(error = %e, "Failed to delete archived progress");
                }
            }
            Err(e) => warn!(error = %e, "Failed to archive completed run"),
        }
    }

    /// Caller holds the control lock.
    async fn resume_paused(&self) -> Result<RunId> {
        let state = self.ctx.state.snapshot().await;
        if !state.is_paused() {
            return Err(SyncError::NotPaused);
        }

        let live_run = {
            let active = self.active_run.lock().await;
            active
                .as_ref()
                .filter(|run| {
                    Some(run.run_id) == state.run_id
                        && !run.handle.is_finished()
                        && !run.cancellation_token.is_cancelled()
                })
                .map(|run| run.run_id)
        };

        let Some(run_id) = live_run else {
            info!("No live worker for the paused run, restoring from checkpoint");
            return self.restore_and_spawn().await;
        };

        let now = self.ctx.clock.unix_timestamp();
        self.ctx.state.transition(SyncStatus::Running).await?;
        self.ctx
            .state
            .update(|s| s.last_activity = Some(now))
            .await;
        self.ctx.checkpoint(run_id).await;

        info!(run_id = %run_id, processed = state.processed, "Sync resumed");
        Ok(run_id)
    }

    /// Rebuild the state from the saved checkpoint and spawn a worker.
    ///
    /// The saved batch is restored as-is so its page is not fetched again.
    /// Caller holds the control lock.
    async fn restore_and_spawn(&self) -> Result<RunId> {
        self.ensure_authenticated()?;

        let progress = {
            let _guard = self.ctx.state.checkpoint_guard().await;
            match self.ctx.progress.load().await? {
                Some(progress) if progress.is_resumable() => progress,
                Some(progress) => {
                    self.archive_completed(&progress).await;
                    return Err(SyncError::NothingToResume);
                }
                None => return Err(SyncError::NothingToResume),
            }
        };

        let username = self.resolve_username().await?;
        let folders = if progress.mode == SyncMode::AllFolders {
            match self.ctx.catalog.get_user_folders(&username).await {
                Ok(folders) => folders,
                Err(e) => {
                    warn!(error = %e, "Could not refresh folder list, finishing after the current folder");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let run_id = RunId::new();
        let now = self.ctx.clock.unix_timestamp();

        let (processed, pending) = self
            .ctx
            .state
            .update(|s| {
                s.reset();
                progress.restore_into(s);
                if let Some(index) = folders.iter().position(|f| f.id == progress.folder_id) {
                    s.folder_index = index;
                }
                s.folders = folders;
                s.status = SyncStatus::Running;
                s.run_id = Some(run_id);
                s.username = username;
                s.last_activity = Some(now);
                (s.processed, s.pending_batch.len())
            })
            .await;

        self.ctx.checkpoint(run_id).await;
        self.spawn_worker(run_id).await;

        info!(
            run_id = %run_id,
            processed,
            pending,
            folder_id = progress.folder_id,
            page = progress.current_page,
            "Sync restored from checkpoint"
        );
        Ok(run_id)
    }

    async fn spawn_worker(&self, run_id: RunId) {
        let mut active = self.active_run.lock().await;
        if let Some(previous) = active.take() {
            previous.cancellation_token.cancel();
        }

        let cancellation_token = CancellationToken::new();
        let worker = SyncWorker::new(self.ctx.clone(), run_id, cancellation_token.clone());
        let active_run = Arc::clone(&self.active_run);

        let handle = tokio::spawn(async move {
            worker.run().await;

            // Clean up active run tracking
            let mut active = active_run.lock().await;
            if active.as_ref().is_some_and(|run| run.run_id == run_id) {
                *active = None;
            }
        });

        *active = Some(ActiveRun {
            run_id,
            cancellation_token,
            handle,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogResult, CoverImage, ItemDetail};
    use crate::progress::SqliteProgressStore;
    use async_trait::async_trait;
    use bridge_traits::time::ManualClock;
    use core_library::db::create_test_pool;
    use core_library::{SqliteAlbumRepository, SqliteSettingsRepository, SqliteSyncLogRepository};
    use mockall::mock;
    use std::time::Duration;

    mock! {
        pub Catalog {}

        #[async_trait]
        impl CatalogClient for Catalog {
            fn is_authenticated(&self) -> bool;
            async fn get_identity(&self) -> CatalogResult<String>;
            async fn get_user_folders(&self, username: &str) -> CatalogResult<Vec<CatalogFolder>>;
            async fn get_user_collection_by_folder(
                &self,
                username: &str,
                folder_id: i64,
                page: u32,
                per_page: u32,
            ) -> CatalogResult<CollectionPage>;
            async fn get_user_collection(
                &self,
                username: &str,
                page: u32,
                per_page: u32,
            ) -> CatalogResult<CollectionPage>;
            async fn get_item_detail(&self, external_id: i64) -> CatalogResult<ItemDetail>;
            async fn download_cover(&self, url: &str) -> CatalogResult<CoverImage>;
        }
    }

    const T0: i64 = 1_700_000_000;

    async fn coordinator(catalog: MockCatalog, clock: Arc<ManualClock>) -> SyncCoordinator {
        let pool = create_test_pool().await.unwrap();
        let deps = SyncDependencies {
            catalog: Arc::new(catalog),
            rate_limiter: Arc::new(RateLimiter::new()),
            progress: Arc::new(SqliteProgressStore::new(pool.clone(), clock.clone())),
            albums: Arc::new(SqliteAlbumRepository::new(pool.clone())),
            sync_log: Arc::new(SqliteSyncLogRepository::new(pool.clone())),
            settings: Arc::new(SqliteSettingsRepository::new(pool)),
            clock,
        };
        SyncCoordinator::new(SyncConfig::immediate(), deps).with_username(Some("digger".to_string()))
    }

    fn authenticated_catalog() -> MockCatalog {
        let mut catalog = MockCatalog::new();
        catalog.expect_is_authenticated().return_const(true);
        catalog
    }

    #[tokio::test]
    async fn test_start_requires_credentials() {
        let mut catalog = MockCatalog::new();
        catalog.expect_is_authenticated().return_const(false);
        let coordinator = coordinator(catalog, Arc::new(ManualClock::at_unix(T0))).await;

        let err = coordinator.start(StartRequest::all_folders()).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(coordinator.status().await, SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_folder_mode_requires_folder_id() {
        let coordinator =
            coordinator(authenticated_catalog(), Arc::new(ManualClock::at_unix(T0))).await;

        let request = StartRequest {
            folder_id: None,
            ..StartRequest::folder(0)
        };
        let err = coordinator.start(request).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_first_page_failure_is_reported_to_caller() {
        let mut catalog = authenticated_catalog();
        catalog.expect_get_user_folders().returning(|_| Ok(Vec::new()));
        catalog
            .expect_get_user_collection_by_folder()
            .returning(|_, _, _, _| {
                Err(CatalogError::Api {
                    status_code: 500,
                    message: "internal error".to_string(),
                })
            });
        let coordinator = coordinator(catalog, Arc::new(ManualClock::at_unix(T0))).await;

        let err = coordinator.start(StartRequest::folder(3)).await.unwrap_err();
        assert!(matches!(err, SyncError::PageFetch { folder_id: 3, page: 1, .. }));
        assert_eq!(coordinator.status().await, SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_username_resolved_from_identity() {
        let mut catalog = authenticated_catalog();
        catalog
            .expect_get_identity()
            .times(1)
            .returning(|| Ok("crate-digger".to_string()));
        catalog
            .expect_get_user_collection()
            .withf(|username, page, _| username == "crate-digger" && *page == 1)
            .returning(|_, _, _| Err(CatalogError::Network("offline".to_string())));

        let clock = Arc::new(ManualClock::at_unix(T0));
        let coordinator = coordinator(catalog, clock).await.with_username(None);

        assert!(coordinator.start(StartRequest::collection()).await.is_err());
        // Cached after the first lookup
        assert!(coordinator.start(StartRequest::collection()).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_identity_is_a_configuration_error() {
        let mut catalog = authenticated_catalog();
        catalog
            .expect_get_identity()
            .returning(|| Err(CatalogError::Unauthorized("invalid token".to_string())));

        let coordinator = coordinator(catalog, Arc::new(ManualClock::at_unix(T0)))
            .await
            .with_username(None);

        let err = coordinator.start(StartRequest::collection()).await.unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_all_folders_total_skips_implicit_all_folder() {
        let mut catalog = authenticated_catalog();
        catalog.expect_get_user_folders().returning(|_| {
            Ok(vec![
                CatalogFolder {
                    id: ALL_FOLDER_ID,
                    name: "All".to_string(),
                    count: 5,
                },
                CatalogFolder {
                    id: 1,
                    name: "Uncategorized".to_string(),
                    count: 3,
                },
                CatalogFolder {
                    id: 2,
                    name: "Vinyl".to_string(),
                    count: 2,
                },
            ])
        });
        let coordinator = coordinator(catalog, Arc::new(ManualClock::at_unix(T0))).await;

        let (folders, first_id, first_name, total) = coordinator
            .resolve_folders(SyncMode::AllFolders, None, "digger")
            .await
            .unwrap();

        assert_eq!(folders.len(), 3);
        assert_eq!(first_id, ALL_FOLDER_ID);
        assert_eq!(first_name, "All");
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn test_control_operations_reject_wrong_state() {
        let coordinator =
            coordinator(authenticated_catalog(), Arc::new(ManualClock::at_unix(T0))).await;

        assert!(matches!(coordinator.pause().await, Err(SyncError::NotRunning)));
        assert!(matches!(
            coordinator.resume_from_pause().await,
            Err(SyncError::NotPaused)
        ));
        assert!(matches!(
            coordinator.resume().await,
            Err(SyncError::NothingToResume)
        ));
        assert!(coordinator.cancel().await.is_ok());
    }

    #[tokio::test]
    async fn test_progress_reports_stall() {
        let clock = Arc::new(ManualClock::at_unix(T0));
        let coordinator = coordinator(authenticated_catalog(), clock.clone()).await;

        coordinator
            .state()
            .update(|s| {
                s.status = SyncStatus::Running;
                s.last_activity = Some(T0);
                s.processed = 12;
            })
            .await;

        let snapshot = coordinator.progress().await;
        assert!(snapshot.is_running);
        assert!(!snapshot.is_stalled);
        assert_eq!(snapshot.processed, 12);

        clock.advance(Duration::from_secs(91));
        let snapshot = coordinator.progress().await;
        assert!(snapshot.is_stalled);
        assert_eq!(snapshot.seconds_since_activity, Some(91));
        assert!(!snapshot.is_rate_limited);
        assert!(snapshot.saved.is_none());
    }

    #[tokio::test]
    async fn test_paused_run_is_not_stalled() {
        let clock = Arc::new(ManualClock::at_unix(T0));
        let coordinator = coordinator(authenticated_catalog(), clock.clone()).await;

        coordinator
            .state()
            .update(|s| {
                s.status = SyncStatus::Paused;
                s.last_activity = Some(T0);
            })
            .await;

        clock.advance(Duration::from_secs(600));
        let snapshot = coordinator.progress().await;
        assert!(snapshot.is_paused);
        assert!(!snapshot.is_stalled);
    }

    #[test]
    fn test_start_request_wire_format() {
        let request: StartRequest =
            serde_json::from_str(r#"{"sync_mode":"specific","folder_id":7}"#).unwrap();
        assert_eq!(request, StartRequest::folder(7));

        let request: StartRequest =
            serde_json::from_str(r#"{"sync_mode":"all-folders","force_new":true}"#).unwrap();
        assert_eq!(request, StartRequest::all_folders().force_new());
    }
}
