//! Album repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{Album, AlbumPatch, CoverArt, NewAlbum, NewTrack, Track};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use tracing::debug;

const ALBUM_COLUMNS: &str = "id, title, artist, release_year, genre, style, label, country, \
     release_date, discogs_id, discogs_folder_id, cover_image_url, cover_image_type, \
     cover_image_failed, created_at, updated_at";

/// Album repository interface for data access operations
#[async_trait]
pub trait AlbumRepository: Send + Sync {
    /// Find the album linked to a catalog release id
    async fn find_by_discogs_id(&self, discogs_id: i64) -> Result<Option<Album>>;

    /// Find an album by exact title and artist
    ///
    /// When several rows share the pair, the oldest one is returned.
    async fn find_by_title_artist(&self, title: &str, artist: &str) -> Result<Option<Album>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Album>>;

    /// Insert an album and its track listing in one transaction
    ///
    /// Either the album and every track are stored, or nothing is.
    ///
    /// # Errors
    /// Returns error if:
    /// - Album or track validation fails
    /// - The catalog id is already linked to another album
    /// - Database error occurs (including lock contention)
    async fn insert_with_tracks(
        &self,
        album: &NewAlbum,
        tracks: &[NewTrack],
        now: i64,
    ) -> Result<i64>;

    /// Apply the set fields of `patch` to an existing album
    async fn apply_patch(&self, id: i64, patch: &AlbumPatch, now: i64) -> Result<()>;

    async fn tracks_for_album(&self, album_id: i64) -> Result<Vec<Track>>;

    async fn cover_image(&self, album_id: i64) -> Result<Option<CoverArt>>;

    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of AlbumRepository
pub struct SqliteAlbumRepository {
    pool: SqlitePool,
}

impl SqliteAlbumRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn invalid(field: &str, message: String) -> LibraryError {
    LibraryError::InvalidInput {
        field: field.to_string(),
        message,
    }
}

#[async_trait]
impl AlbumRepository for SqliteAlbumRepository {
    async fn find_by_discogs_id(&self, discogs_id: i64) -> Result<Option<Album>> {
        let sql = format!("SELECT {} FROM albums WHERE discogs_id = ?", ALBUM_COLUMNS);
        let album = query_as::<_, Album>(&sql)
            .bind(discogs_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(album)
    }

    async fn find_by_title_artist(&self, title: &str, artist: &str) -> Result<Option<Album>> {
        let sql = format!(
            "SELECT {} FROM albums WHERE title = ? AND artist = ? ORDER BY id ASC LIMIT 1",
            ALBUM_COLUMNS
        );
        let album = query_as::<_, Album>(&sql)
            .bind(title)
            .bind(artist)
            .fetch_optional(&self.pool)
            .await?;

        Ok(album)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Album>> {
        let sql = format!("SELECT {} FROM albums WHERE id = ?", ALBUM_COLUMNS);
        let album = query_as::<_, Album>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(album)
    }

    async fn insert_with_tracks(
        &self,
        album: &NewAlbum,
        tracks: &[NewTrack],
        now: i64,
    ) -> Result<i64> {
        album.validate().map_err(|e| invalid("Album", e))?;
        for track in tracks {
            track.validate().map_err(|e| invalid("Track", e))?;
        }

        let mut tx = self.pool.begin().await?;

        let result = query(
            r#"
            INSERT INTO albums (
                title, artist, release_year, genre, style, label, country, release_date,
                discogs_id, discogs_folder_id, cover_image_url, cover_image, cover_image_type,
                cover_image_failed, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&album.title)
        .bind(&album.artist)
        .bind(album.release_year)
        .bind(&album.genre)
        .bind(&album.style)
        .bind(&album.label)
        .bind(&album.country)
        .bind(&album.release_date)
        .bind(album.discogs_id)
        .bind(album.discogs_folder_id)
        .bind(&album.cover_image_url)
        .bind(album.cover_image.as_ref().map(|art| art.data.clone()))
        .bind(album.cover_image.as_ref().map(|art| art.content_type.clone()))
        .bind(album.cover_image_failed)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let album_id = result.last_insert_rowid();

        for track in tracks {
            query(
                r#"
                INSERT INTO tracks (
                    album_id, title, duration_secs, track_number, disc_number,
                    side, position, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(album_id)
            .bind(&track.title)
            .bind(track.duration_secs)
            .bind(track.track_number)
            .bind(track.disc_number)
            .bind(&track.side)
            .bind(&track.position)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            album_id,
            discogs_id = ?album.discogs_id,
            tracks = tracks.len(),
            "Inserted album with tracks"
        );

        Ok(album_id)
    }

    async fn apply_patch(&self, id: i64, patch: &AlbumPatch, now: i64) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let result = query(
            r#"
            UPDATE albums
            SET discogs_id = COALESCE(?, discogs_id),
                discogs_folder_id = COALESCE(?, discogs_folder_id),
                release_year = COALESCE(?, release_year),
                cover_image_url = COALESCE(?, cover_image_url),
                cover_image = COALESCE(?, cover_image),
                cover_image_type = COALESCE(?, cover_image_type),
                cover_image_failed = COALESCE(?, cover_image_failed),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(patch.discogs_id)
        .bind(patch.discogs_folder_id)
        .bind(patch.release_year)
        .bind(&patch.cover_image_url)
        .bind(patch.cover_image.as_ref().map(|art| art.data.clone()))
        .bind(patch.cover_image.as_ref().map(|art| art.content_type.clone()))
        .bind(patch.cover_image_failed)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "Album".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn tracks_for_album(&self, album_id: i64) -> Result<Vec<Track>> {
        let tracks = query_as::<_, Track>(
            r#"
            SELECT id, album_id, title, duration_secs, track_number, disc_number,
                   side, position, created_at
            FROM tracks
            WHERE album_id = ?
            ORDER BY disc_number ASC, track_number ASC
            "#,
        )
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tracks)
    }

    async fn cover_image(&self, album_id: i64) -> Result<Option<CoverArt>> {
        let row: Option<(Option<Vec<u8>>, Option<String>)> =
            query_as("SELECT cover_image, cover_image_type FROM albums WHERE id = ?")
                .bind(album_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            Some((Some(data), content_type)) => Some(CoverArt {
                data,
                content_type: content_type.unwrap_or_default(),
            }),
            _ => None,
        })
    }

    async fn count(&self) -> Result<i64> {
        let count: (i64,) = query_as("SELECT COUNT(*) FROM albums")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn setup_repo() -> SqliteAlbumRepository {
        SqliteAlbumRepository::new(create_test_pool().await.unwrap())
    }

    fn track(title: &str, number: i32) -> NewTrack {
        NewTrack {
            title: title.to_string(),
            duration_secs: 180,
            track_number: number,
            disc_number: 1,
            side: Some("A".to_string()),
            position: Some(format!("A{}", number)),
        }
    }

    fn blue_train() -> NewAlbum {
        NewAlbum {
            discogs_id: Some(1001),
            discogs_folder_id: 1,
            release_year: 1957,
            ..NewAlbum::new("Blue Train", "John Coltrane")
        }
    }

    #[tokio::test]
    async fn test_insert_with_tracks_and_lookup() {
        let repo = setup_repo().await;

        let id = repo
            .insert_with_tracks(&blue_train(), &[track("Blue Train", 1), track("Moment's Notice", 2)], 100)
            .await
            .unwrap();

        let by_id = repo.find_by_discogs_id(1001).await.unwrap().unwrap();
        assert_eq!(by_id.id, id);
        assert_eq!(by_id.release_year, 1957);

        let by_text = repo
            .find_by_title_artist("Blue Train", "John Coltrane")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_text.id, id);

        let tracks = repo.tracks_for_album(id).await.unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].title, "Moment's Notice");
    }

    #[tokio::test]
    async fn test_duplicate_catalog_id_is_rejected() {
        let repo = setup_repo().await;
        repo.insert_with_tracks(&blue_train(), &[track("Blue Train", 1)], 100)
            .await
            .unwrap();

        let duplicate = NewAlbum {
            title: "Blue Train (Reissue)".to_string(),
            ..blue_train()
        };
        let result = repo
            .insert_with_tracks(&duplicate, &[track("Blue Train", 1)], 200)
            .await;

        assert!(matches!(result, Err(LibraryError::Database(_))));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_track_rejects_whole_album() {
        let repo = setup_repo().await;

        let result = repo
            .insert_with_tracks(&blue_train(), &[track("", 1)], 100)
            .await;

        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_title_artist_lookup_returns_oldest_duplicate() {
        let repo = setup_repo().await;
        let legacy = NewAlbum::new("Giant Steps", "John Coltrane");

        let first = repo.insert_with_tracks(&legacy, &[], 100).await.unwrap();
        repo.insert_with_tracks(&legacy, &[], 200).await.unwrap();

        let found = repo
            .find_by_title_artist("Giant Steps", "John Coltrane")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first);
    }

    #[tokio::test]
    async fn test_apply_patch_only_touches_set_fields() {
        let repo = setup_repo().await;
        let legacy = NewAlbum {
            genre: Some("Jazz".to_string()),
            ..NewAlbum::new("Giant Steps", "John Coltrane")
        };
        let id = repo.insert_with_tracks(&legacy, &[], 100).await.unwrap();

        let patch = AlbumPatch {
            discogs_id: Some(2002),
            release_year: Some(1960),
            cover_image: Some(CoverArt {
                data: vec![1, 2, 3],
                content_type: "image/jpeg".to_string(),
            }),
            ..AlbumPatch::default()
        };
        repo.apply_patch(id, &patch, 300).await.unwrap();

        let album = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(album.discogs_id, Some(2002));
        assert_eq!(album.release_year, 1960);
        assert_eq!(album.genre.as_deref(), Some("Jazz"));
        assert_eq!(album.updated_at, 300);
        assert_eq!(album.cover_image_type.as_deref(), Some("image/jpeg"));

        let cover = repo.cover_image(id).await.unwrap().unwrap();
        assert_eq!(cover.data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_apply_patch_missing_album() {
        let repo = setup_repo().await;
        let patch = AlbumPatch {
            release_year: Some(1999),
            ..AlbumPatch::default()
        };

        let result = repo.apply_patch(42, &patch, 100).await;
        assert!(matches!(result, Err(LibraryError::NotFound { .. })));
    }
}
