//! # Reconciler
//!
//! Merges one catalog item into the local collection.
//!
//! ## Matching
//!
//! An item matches a local album by catalog id first, then by exact
//! (title, artist). The second lookup picks up albums created before ids were
//! tracked; when several albums share the pair, the oldest wins.
//!
//! ## Updates
//!
//! A matched album is only filled in, never overwritten: a missing catalog id
//! is linked, the folder follows the catalog, a changed cover URL is taken
//! (and its image downloaded again), and a zero year is replaced.
//!
//! ## Creation
//!
//! Release details are fetched first, then the album and its whole track
//! listing are inserted in one transaction. A failed detail fetch or an empty
//! track listing leaves nothing behind. Inserts that lose a lock race are
//! retried with linear backoff; every other failure is written to the sync
//! log for manual follow-up.

use crate::catalog::{
    CatalogClient, CatalogError, CatalogItem, CatalogResult, CatalogTrack, CoverImage,
};
use crate::config::SyncConfig;
use bridge_traits::time::Clock;
use core_library::{
    Album, AlbumPatch, AlbumRepository, CoverArt, NewAlbum, NewSyncLogEntry, NewTrack,
    SyncLogKind, SyncLogRepository,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of reconciling one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created { album_id: i64 },
    Updated { album_id: i64 },
    Unchanged { album_id: i64 },
    /// Logged to the sync log; the item still counts as processed
    Failed { kind: SyncLogKind, message: String },
    /// The run was cancelled mid-item; nothing was written
    Cancelled,
}

impl ReconcileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ReconcileOutcome::Failed { .. })
    }
}

enum Attempt<T> {
    Done(T),
    Failed(String),
    Cancelled,
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` when cancelled.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

pub struct Reconciler {
    albums: Arc<dyn AlbumRepository>,
    sync_log: Arc<dyn SyncLogRepository>,
    catalog: Arc<dyn CatalogClient>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl Reconciler {
    pub fn new(
        albums: Arc<dyn AlbumRepository>,
        sync_log: Arc<dyn SyncLogRepository>,
        catalog: Arc<dyn CatalogClient>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            albums,
            sync_log,
            catalog,
            clock,
            config,
        }
    }

    /// Reconcile `item`, found while paging `current_folder`.
    ///
    /// Never fails: errors are logged and reported as
    /// [`ReconcileOutcome::Failed`].
    pub async fn reconcile(
        &self,
        item: &CatalogItem,
        current_folder: i64,
        cancel: &CancellationToken,
    ) -> ReconcileOutcome {
        let folder_id = if item.folder_id != 0 {
            item.folder_id
        } else {
            current_folder
        };

        let existing = match self.find_existing(item).await {
            Ok(existing) => existing,
            Err(e) => {
                return self
                    .fail(item, SyncLogKind::Album, format!("Failed to look up album: {}", e))
                    .await
            }
        };

        match existing {
            Some(album) => self.update_existing(album, item, folder_id, cancel).await,
            None => self.create(item, folder_id, cancel).await,
        }
    }

    /// Local album for `item`: by catalog id, else by exact title and artist.
    pub async fn find_existing(&self, item: &CatalogItem) -> core_library::Result<Option<Album>> {
        if item.has_external_id() {
            if let Some(album) = self.albums.find_by_discogs_id(item.external_id).await? {
                return Ok(Some(album));
            }
        }

        self.albums
            .find_by_title_artist(&item.title, &item.artist)
            .await
    }

    async fn update_existing(
        &self,
        album: Album,
        item: &CatalogItem,
        folder_id: i64,
        cancel: &CancellationToken,
    ) -> ReconcileOutcome {
        let mut patch = build_patch(&album, item, folder_id);

        if let Some(url) = patch.cover_image_url.clone() {
            match self.download_cover(&url, cancel).await {
                Attempt::Done(cover) => {
                    patch.cover_image = Some(to_cover_art(cover));
                    patch.cover_image_failed = Some(false);
                }
                Attempt::Failed(message) => {
                    patch.cover_image_failed = Some(true);
                    self.log_failure(item, SyncLogKind::Image, &message).await;
                }
                Attempt::Cancelled => return ReconcileOutcome::Cancelled,
            }
        }

        if patch.is_empty() {
            debug!(album_id = album.id, title = %item.title, "Album already up to date");
            return ReconcileOutcome::Unchanged { album_id: album.id };
        }

        match self
            .albums
            .apply_patch(album.id, &patch, self.clock.unix_timestamp())
            .await
        {
            Ok(()) => {
                info!(album_id = album.id, title = %item.title, artist = %item.artist, "Updated album");
                ReconcileOutcome::Updated { album_id: album.id }
            }
            Err(e) => {
                self.fail(item, SyncLogKind::Album, format!("Failed to update album: {}", e))
                    .await
            }
        }
    }

    async fn create(
        &self,
        item: &CatalogItem,
        folder_id: i64,
        cancel: &CancellationToken,
    ) -> ReconcileOutcome {
        let detail = if item.has_external_id() {
            let external_id = item.external_id;
            match self
                .retry(
                    self.config.detail_fetch_attempts,
                    self.config.detail_fetch_backoff,
                    cancel,
                    || self.catalog.get_item_detail(external_id),
                )
                .await
            {
                Attempt::Done(detail) => Some(detail),
                Attempt::Failed(message) => {
                    return self
                        .fail(
                            item,
                            SyncLogKind::Tracks,
                            format!("Failed to fetch release details: {}", message),
                        )
                        .await
                }
                Attempt::Cancelled => return ReconcileOutcome::Cancelled,
            }
        } else {
            None
        };

        let tracks = match &detail {
            Some(detail) => {
                let tracks = to_new_tracks(&detail.tracks);
                if tracks.is_empty() {
                    return self
                        .fail(item, SyncLogKind::Tracks, "No tracks found for release".to_string())
                        .await;
                }
                tracks
            }
            None => Vec::new(),
        };

        let cover_url = item
            .cover_url()
            .or_else(|| {
                detail
                    .as_ref()
                    .and_then(|d| d.cover_url.as_deref())
                    .filter(|url| !url.is_empty())
            })
            .map(str::to_string);

        let mut album = NewAlbum::new(item.title.clone(), item.artist.clone());
        album.discogs_id = item.has_external_id().then_some(item.external_id);
        album.discogs_folder_id = folder_id;
        album.release_year = item.year;
        if let Some(detail) = &detail {
            if album.release_year <= 0 {
                album.release_year = detail.year.max(0);
            }
            album.genre = detail.genre.clone();
            album.style = detail.style.clone();
            album.label = detail.label.clone();
            album.country = detail.country.clone();
            album.release_date = detail.release_date.clone();
        }

        if let Some(url) = &cover_url {
            match self.download_cover(url, cancel).await {
                Attempt::Done(cover) => album.cover_image = Some(to_cover_art(cover)),
                Attempt::Failed(message) => {
                    album.cover_image_failed = true;
                    self.log_failure(item, SyncLogKind::Image, &message).await;
                }
                Attempt::Cancelled => return ReconcileOutcome::Cancelled,
            }
        }
        album.cover_image_url = cover_url;

        let attempts = self.config.insert_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return ReconcileOutcome::Cancelled;
            }

            match self
                .albums
                .insert_with_tracks(&album, &tracks, self.clock.unix_timestamp())
                .await
            {
                Ok(album_id) => {
                    info!(
                        album_id,
                        discogs_id = item.external_id,
                        title = %item.title,
                        artist = %item.artist,
                        tracks = tracks.len(),
                        "Created album"
                    );
                    return ReconcileOutcome::Created { album_id };
                }
                Err(e) if e.is_lock_contention() && attempt < attempts => {
                    warn!(
                        attempt,
                        attempts,
                        title = %item.title,
                        error = %e,
                        "Album insert hit lock contention, retrying"
                    );
                    if !sleep_or_cancel(self.config.insert_backoff * attempt, cancel).await {
                        return ReconcileOutcome::Cancelled;
                    }
                }
                Err(e) => {
                    return self
                        .fail(item, SyncLogKind::Album, format!("Failed to create album: {}", e))
                        .await
                }
            }
        }
    }

    async fn download_cover(&self, url: &str, cancel: &CancellationToken) -> Attempt<CoverImage> {
        self.retry(
            self.config.cover_download_attempts,
            self.config.cover_download_backoff,
            cancel,
            || self.catalog.download_cover(url),
        )
        .await
    }

    /// Run `op` up to `attempts` times, sleeping `backoff * attempt` between
    /// tries. A not-found reply is not retried.
    async fn retry<T, F, Fut>(
        &self,
        attempts: u32,
        backoff: Duration,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Attempt<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CatalogResult<T>>,
    {
        let attempts = attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Attempt::Cancelled;
            }

            match op().await {
                Ok(value) => return Attempt::Done(value),
                Err(e) => {
                    last_error = e.to_string();
                    if matches!(e, CatalogError::NotFound(_)) || attempt == attempts {
                        break;
                    }
                    debug!(attempt, attempts, error = %e, "Catalog request failed, retrying");
                    if !sleep_or_cancel(backoff * attempt, cancel).await {
                        return Attempt::Cancelled;
                    }
                }
            }
        }

        Attempt::Failed(last_error)
    }

    async fn fail(
        &self,
        item: &CatalogItem,
        kind: SyncLogKind,
        message: String,
    ) -> ReconcileOutcome {
        self.log_failure(item, kind, &message).await;
        ReconcileOutcome::Failed { kind, message }
    }

    async fn log_failure(&self, item: &CatalogItem, kind: SyncLogKind, message: &str) {
        warn!(
            discogs_id = item.external_id,
            title = %item.title,
            artist = %item.artist,
            kind = %kind,
            error = %message,
            "Failed to sync item"
        );

        let entry = NewSyncLogEntry {
            discogs_id: item.has_external_id().then_some(item.external_id),
            album_title: item.title.clone(),
            artist: item.artist.clone(),
            kind,
            message: message.to_string(),
        };

        if let Err(e) = self
            .sync_log
            .record(&entry, self.clock.unix_timestamp())
            .await
        {
            warn!(error = %e, title = %item.title, "Failed to write sync log entry");
        }
    }
}

/// Fields of `album` that `item` may fill in. Never touches the cover image
/// bytes; the caller downloads them for a changed URL.
pub fn build_patch(album: &Album, item: &CatalogItem, folder_id: i64) -> AlbumPatch {
    let mut patch = AlbumPatch::default();

    if album.discogs_id.is_none() && item.has_external_id() {
        patch.discogs_id = Some(item.external_id);
    }

    if folder_id > 0 && album.discogs_folder_id != folder_id {
        patch.discogs_folder_id = Some(folder_id);
    }

    if let Some(url) = item.cover_url() {
        if album.cover_image_url.as_deref() != Some(url) {
            patch.cover_image_url = Some(url.to_string());
        }
    }

    if album.release_year == 0 && item.year > 0 {
        patch.release_year = Some(item.year);
    }

    patch
}

fn to_new_tracks(tracks: &[CatalogTrack]) -> Vec<NewTrack> {
    tracks
        .iter()
        .filter(|track| !track.title.trim().is_empty())
        .map(|track| NewTrack {
            title: track.title.clone(),
            duration_secs: i64::from(track.duration_secs),
            track_number: i32::try_from(track.track_number).unwrap_or(i32::MAX).max(1),
            disc_number: i32::try_from(track.disc_number).unwrap_or(i32::MAX).max(1),
            side: track.side.clone(),
            position: Some(track.position.clone()).filter(|p| !p.is_empty()),
        })
        .collect()
}

fn to_cover_art(cover: CoverImage) -> CoverArt {
    CoverArt {
        data: cover.data,
        content_type: cover.content_type,
    }
}

// ============================================================================
// Tests
// ============================================================================
