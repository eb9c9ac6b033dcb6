//! # Sync Worker
//!
//! The background loop that drives one run from its first page to its last.
//!
//! Each turn of the loop marks activity, honours pause and cancel, fetches
//! the next page when the pending batch is empty, then reconciles the batch
//! one item at a time. After every item the processed count and the batch are
//! updated together and written as a checkpoint, so a crash replays at most
//! the item that was in flight.
//!
//! Pagination ends with the catalog's "page out of range" reply or an empty
//! page. In all-folders mode that moves on to the next folder; after the last
//! folder the run is archived and the state returns to idle. Any other page
//! fetch error stops the run and is surfaced through the progress snapshot.

use crate::catalog::{CatalogClient, CatalogError, CollectionPage};
use crate::config::SyncConfig;
use crate::progress::{ProgressStatus, ProgressStore, SyncProgress};
use crate::rate_limiter::{RateLimiter, RequestClass};
use crate::reconciler::{sleep_or_cancel, ReconcileOutcome, Reconciler};
use crate::state::{RunId, SyncMode, SyncStateManager, SyncStatus};
use crate::{Result, SyncError};
use bridge_traits::time::Clock;
use core_library::SettingsRepository;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Shared handles the control surface and the worker both use
#[derive(Clone)]
pub struct SyncContext {
    pub config: SyncConfig,
    pub state: Arc<SyncStateManager>,
    pub catalog: Arc<dyn CatalogClient>,
    pub rate_limiter: Arc<RateLimiter>,
    pub progress: Arc<dyn ProgressStore>,
    pub settings: Arc<dyn SettingsRepository>,
    pub reconciler: Arc<Reconciler>,
    pub clock: Arc<dyn Clock>,
}

impl SyncContext {
    /// Persist the state owned by `run_id`.
    ///
    /// Skipped once the run no longer owns the state or has gone idle, so a
    /// late write can never bring back a cancelled checkpoint. Failures are
    /// logged; the in-memory run carries on.
    pub async fn checkpoint(&self, run_id: RunId) {
        let _guard = self.state.checkpoint_guard().await;

        let Some(snapshot) = self.state.read_run(run_id, |s| s.clone()).await else {
            return;
        };

        let status = match snapshot.status {
            SyncStatus::Idle => return,
            SyncStatus::Paused => ProgressStatus::Paused,
            SyncStatus::Running => ProgressStatus::Running,
        };

        let now = self.clock.unix_timestamp();
        let saved = match SyncProgress::from_state(&snapshot, status, now) {
            Ok(progress) => self.progress.save(&progress).await,
            Err(e) => Err(e),
        };

        if let Err(e) = saved {
            warn!(run_id = %run_id, error = %e, "Failed to save progress checkpoint");
        }
    }
}

enum LoopExit {
    /// Every page of every folder was processed
    Completed,
    /// Cancelled, or another run took over the state
    Stopped,
}

enum PageStep {
    Loaded,
    NextFolder,
    Finished,
    Stopped,
}

enum BatchStep {
    Drained,
    Interrupted,
    Stopped,
}

pub struct SyncWorker {
    ctx: SyncContext,
    run_id: RunId,
    cancel: CancellationToken,
}

impl SyncWorker {
    pub fn new(ctx: SyncContext, run_id: RunId, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            run_id,
            cancel,
        }
    }

    /// Drive the run to completion, cancellation or a fatal error.
    pub async fn run(self) {
        let span = info_span!("sync_worker", run_id = %self.run_id);
        async move {
            info!("Sync worker started");
            match self.run_loop().await {
                Ok(LoopExit::Completed) => self.finish().await,
                Ok(LoopExit::Stopped) => info!("Sync worker stopped"),
                Err(e) => self.fail(e).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn run_loop(&self) -> Result<LoopExit> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(LoopExit::Stopped);
            }

            let now = self.ctx.clock.unix_timestamp();
            let Some((status, batch_empty)) = self
                .ctx
                .state
                .update_run(self.run_id, |s| {
                    s.last_activity = Some(now);
                    (s.status, s.pending_batch.is_empty())
                })
                .await
            else {
                return Ok(LoopExit::Stopped);
            };

            match status {
                SyncStatus::Idle => return Ok(LoopExit::Stopped),
                SyncStatus::Paused => {
                    if !self.wait_while_paused().await {
                        return Ok(LoopExit::Stopped);
                    }
                    continue;
                }
                SyncStatus::Running => {}
            }

            if batch_empty {
                match self.fetch_next_page().await? {
                    PageStep::Loaded | PageStep::NextFolder => continue,
                    PageStep::Finished => return Ok(LoopExit::Completed),
                    PageStep::Stopped => return Ok(LoopExit::Stopped),
                }
            }

            match self.process_batch().await {
                BatchStep::Drained => {
                    if !sleep_or_cancel(self.ctx.config.batch_delay, &self.cancel).await {
                        return Ok(LoopExit::Stopped);
                    }
                }
                BatchStep::Interrupted => {}
                BatchStep::Stopped => return Ok(LoopExit::Stopped),
            }
        }
    }

    /// Poll until the run is resumed. Returns `false` when it ends instead.
    async fn wait_while_paused(&self) -> bool {
        debug!("Sync paused, waiting for resume");
        loop {
            if !sleep_or_cancel(self.ctx.config.pause_poll_interval, &self.cancel).await {
                return false;
            }

            match self.ctx.state.read_run(self.run_id, |s| s.status).await {
                Some(SyncStatus::Running) => {
                    info!("Sync resumed");
                    return true;
                }
                Some(SyncStatus::Paused) => {}
                Some(SyncStatus::Idle) | None => return false,
            }
        }
    }

    async fn fetch_next_page(&self) -> Result<PageStep> {
        let Some((mode, username, folder_id, page)) = self
            .ctx
            .state
            .read_run(self.run_id, |s| {
                (s.mode, s.username.clone(), s.current_folder, s.current_page)
            })
            .await
        else {
            return Ok(PageStep::Stopped);
        };

        if !sleep_or_cancel(self.ctx.config.fetch_delay, &self.cancel).await {
            return Ok(PageStep::Stopped);
        }

        self.ctx.rate_limiter.wait(RequestClass::Authenticated).await;
        if self.cancel.is_cancelled() {
            return Ok(PageStep::Stopped);
        }

        debug!(folder_id, page, %mode, "Fetching collection page");
        let per_page = self.ctx.config.batch_size;
        let fetched = match mode {
            SyncMode::Collection => {
                self.ctx
                    .catalog
                    .get_user_collection(&username, page, per_page)
                    .await
            }
            SyncMode::AllFolders | SyncMode::Folder => {
                self.ctx
                    .catalog
                    .get_user_collection_by_folder(&username, folder_id, page, per_page)
                    .await
            }
        };

        match fetched {
            Ok(result) if !result.items.is_empty() => self.load_page(mode, page, result).await,
            Ok(_) => {
                debug!(folder_id, page, "Empty page, end of folder");
                self.advance_folder().await
            }
            Err(CatalogError::PageOutOfRange { .. }) => {
                debug!(folder_id, page, "Page out of range, end of folder");
                self.advance_folder().await
            }
            Err(source) => Err(SyncError::PageFetch {
                folder_id,
                page,
                source,
            }),
        }
    }

    async fn load_page(
        &self,
        mode: SyncMode,
        page: u32,
        result: CollectionPage,
    ) -> Result<PageStep> {
        let api_status = self.ctx.rate_limiter.status().await;
        let count = result.items.len();

        let loaded = self
            .ctx
            .state
            .update_run(self.run_id, |s| {
                s.pending_batch = result.items.into();
                s.current_page = page + 1;
                // All-folders totals are summed from the folder list up front
                if mode != SyncMode::AllFolders && result.total_items > 0 {
                    s.total = result.total_items;
                }
                s.api_remaining = Some(api_status.auth_remaining);
            })
            .await;

        if loaded.is_none() {
            return Ok(PageStep::Stopped);
        }

        info!(page, items = count, "Loaded collection page");
        self.ctx.checkpoint(self.run_id).await;
        Ok(PageStep::Loaded)
    }

    async fn advance_folder(&self) -> Result<PageStep> {
        let advanced = self
            .ctx
            .state
            .update_run(self.run_id, |s| {
                s.advance_folder()
                    .then(|| (s.current_folder, s.current_folder_name.clone()))
            })
            .await;

        match advanced {
            None => Ok(PageStep::Stopped),
            Some(None) => Ok(PageStep::Finished),
            Some(Some((folder_id, folder_name))) => {
                info!(folder_id, folder = %folder_name, "Moving to next folder");
                self.ctx.checkpoint(self.run_id).await;
                Ok(PageStep::NextFolder)
            }
        }
    }

    async fn process_batch(&self) -> BatchStep {
        loop {
            if self.cancel.is_cancelled() {
                return BatchStep::Stopped;
            }

            let now = self.ctx.clock.unix_timestamp();
            let next = self
                .ctx
                .state
                .update_run(self.run_id, |s| {
                    s.last_activity = Some(now);
                    if s.status != SyncStatus::Running {
                        return Err(s.status);
                    }
                    Ok(s.pending_batch.front().cloned().map(|item| (item, s.current_folder)))
                })
                .await;

            let (item, folder_id) = match next {
                None => return BatchStep::Stopped,
                Some(Err(_)) => return BatchStep::Interrupted,
                Some(Ok(None)) => return BatchStep::Drained,
                Some(Ok(Some(next))) => next,
            };

            let outcome = self
                .ctx
                .reconciler
                .reconcile(&item, folder_id, &self.cancel)
                .await;

            if outcome == ReconcileOutcome::Cancelled {
                return BatchStep::Stopped;
            }

            let now = self.ctx.clock.unix_timestamp();
            let completed = self
                .ctx
                .state
                .update_run(self.run_id, |s| {
                    s.last_activity = Some(now);
                    s.complete_item(&item).then_some(s.processed)
                })
                .await;

            let Some(processed) = completed else {
                return BatchStep::Stopped;
            };
            debug!(
                discogs_id = item.external_id,
                title = %item.title,
                processed = ?processed,
                failed = outcome.is_failure(),
                "Item processed"
            );

            self.ctx.checkpoint(self.run_id).await;
        }
    }

    /// Natural completion: archive the run and clear the live checkpoint.
    async fn finish(&self) {
        let _guard = self.ctx.state.checkpoint_guard().await;
        let now = self.ctx.clock.unix_timestamp();

        let Some(snapshot) = self
            .ctx
            .state
            .update_run(self.run_id, |s| {
                s.total = s.processed;
                s.status = SyncStatus::Idle;
                s.pending_batch.clear();
                s.last_activity = Some(now);
                s.last_error = None;
                let snapshot = s.clone();
                s.run_id = None;
                snapshot
            })
            .await
        else {
            return;
        };

        info!(
            processed = snapshot.processed,
            mode = %snapshot.mode,
            "Sync completed"
        );

        let progress = match SyncProgress::from_state(&snapshot, ProgressStatus::Completed, now) {
            Ok(progress) => progress,
            Err(e) => {
                error!(error = %e, "Failed to build final progress record");
                return;
            }
        };

        if let Err(e) = self.ctx.progress.save(&progress).await {
            warn!(error = %e, "Failed to save final progress");
        }

        match self.ctx.progress.archive_to_history(&progress, now).await {
            Ok(_) => {
                if let Err(e) = self.ctx.progress.delete(progress.id).await {
                    warn!(error = %e, "Failed to delete finished progress");
                }
            }
            // The completed record stays behind; the next start archives it
            Err(e) => warn!(error = %e, "Failed to archive sync run"),
        }

        if let Err(e) = self.ctx.settings.mark_synced(now).await {
            warn!(error = %e, "Failed to record last sync time");
        }
    }

    /// Fatal error: stop at idle, keep the checkpoint for a later resume.
    async fn fail(&self, err: SyncError) {
        error!(error = %err, "Sync failed");
        let _guard = self.ctx.state.checkpoint_guard().await;
        let now = self.ctx.clock.unix_timestamp();

        let Some(snapshot) = self
            .ctx
            .state
            .update_run(self.run_id, |s| {
                s.status = SyncStatus::Idle;
                s.last_error = Some(err.to_string());
                let snapshot = s.clone();
                s.run_id = None;
                snapshot
            })
            .await
        else {
            return;
        };

        let saved = match SyncProgress::from_state(&snapshot, ProgressStatus::Paused, now) {
            Ok(progress) => self.ctx.progress.save(&progress).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!(error = %e, "Failed to save progress after sync failure");
        }
    }
}
