//! Domain models for the local record collection
//!
//! Row types derive `FromRow` and map one-to-one onto the tables in
//! `migrations/`. Insert payloads (`New*`) carry validation.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// =============================================================================
// Albums
// =============================================================================

/// Album as stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Album {
    pub id: i64,
    pub title: String,
    pub artist: String,
    /// 0 when unknown
    pub release_year: i32,
    pub genre: Option<String>,
    pub style: Option<String>,
    pub label: Option<String>,
    pub country: Option<String>,
    pub release_date: Option<String>,
    /// Catalog release id; `None` for records created before ids were tracked
    pub discogs_id: Option<i64>,
    pub discogs_folder_id: i64,
    pub cover_image_url: Option<String>,
    pub cover_image_type: Option<String>,
    pub cover_image_failed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Album {
    pub fn has_cover_url(&self) -> bool {
        self.cover_image_url
            .as_deref()
            .is_some_and(|url| !url.is_empty())
    }
}

/// Downloaded cover art
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Payload for creating an album
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAlbum {
    pub title: String,
    pub artist: String,
    pub release_year: i32,
    pub genre: Option<String>,
    pub style: Option<String>,
    pub label: Option<String>,
    pub country: Option<String>,
    pub release_date: Option<String>,
    pub discogs_id: Option<i64>,
    pub discogs_folder_id: i64,
    pub cover_image_url: Option<String>,
    pub cover_image: Option<CoverArt>,
    pub cover_image_failed: bool,
}

impl NewAlbum {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Album title cannot be empty".to_string());
        }

        if self.artist.trim().is_empty() {
            return Err("Album artist cannot be empty".to_string());
        }

        if self.release_year < 0 || self.release_year > 2100 {
            return Err(format!(
                "Album year {} is out of valid range",
                self.release_year
            ));
        }

        Ok(())
    }
}

/// Partial update for an existing album. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumPatch {
    pub discogs_id: Option<i64>,
    pub discogs_folder_id: Option<i64>,
    pub release_year: Option<i32>,
    pub cover_image_url: Option<String>,
    pub cover_image: Option<CoverArt>,
    pub cover_image_failed: Option<bool>,
}

impl AlbumPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

// =============================================================================
// Tracks
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Track {
    pub id: i64,
    pub album_id: i64,
    pub title: String,
    pub duration_secs: i64,
    pub track_number: i32,
    pub disc_number: i32,
    /// Vinyl side letter, when the position had one
    pub side: Option<String>,
    /// Position exactly as listed by the catalog ("A1", "2-3", ...)
    pub position: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrack {
    pub title: String,
    pub duration_secs: i64,
    pub track_number: i32,
    pub disc_number: i32,
    pub side: Option<String>,
    pub position: Option<String>,
}

impl NewTrack {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Track title cannot be empty".to_string());
        }

        if self.duration_secs < 0 {
            return Err("Track duration cannot be negative".to_string());
        }

        if self.track_number <= 0 {
            return Err("Track number must be positive".to_string());
        }

        if self.disc_number <= 0 {
            return Err("Disc number must be positive".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// Sync log
// =============================================================================

/// Which step of an item import failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncLogKind {
    Album,
    Tracks,
    Image,
}

impl SyncLogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncLogKind::Album => "album",
            SyncLogKind::Tracks => "tracks",
            SyncLogKind::Image => "image",
        }
    }
}

impl std::fmt::Display for SyncLogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure record kept for manual remediation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SyncLogEntry {
    pub id: i64,
    pub discogs_id: Option<i64>,
    pub album_title: String,
    pub artist: String,
    pub error_type: String,
    pub error_msg: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncLogEntry {
    pub discogs_id: Option<i64>,
    pub album_title: String,
    pub artist: String,
    pub kind: SyncLogKind,
    pub message: String,
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AppSettings {
    pub sync_mode: Option<String>,
    pub sync_folder_id: i64,
    pub last_sync_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_album_validation() {
        assert!(NewAlbum::new("Kind of Blue", "Miles Davis").validate().is_ok());
        assert!(NewAlbum::new("  ", "Miles Davis").validate().is_err());
        assert!(NewAlbum::new("Kind of Blue", "").validate().is_err());

        let mut album = NewAlbum::new("Kind of Blue", "Miles Davis");
        album.release_year = 3000;
        assert!(album.validate().is_err());
    }

    #[test]
    fn test_new_track_validation() {
        let track = NewTrack {
            title: "So What".to_string(),
            duration_secs: 562,
            track_number: 1,
            disc_number: 1,
            side: Some("A".to_string()),
            position: Some("A1".to_string()),
        };
        assert!(track.validate().is_ok());

        let untitled = NewTrack {
            title: String::new(),
            ..track.clone()
        };
        assert!(untitled.validate().is_err());

        let bad_disc = NewTrack {
            disc_number: 0,
            ..track
        };
        assert!(bad_disc.validate().is_err());
    }

    #[test]
    fn test_album_patch_is_empty() {
        assert!(AlbumPatch::default().is_empty());

        let patch = AlbumPatch {
            release_year: Some(1959),
            ..AlbumPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_sync_log_kind_strings() {
        assert_eq!(SyncLogKind::Album.as_str(), "album");
        assert_eq!(SyncLogKind::Tracks.to_string(), "tracks");
        assert_eq!(SyncLogKind::Image.as_str(), "image");
    }
}
