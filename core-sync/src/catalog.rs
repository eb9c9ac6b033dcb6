//! # Catalog Client
//!
//! The boundary between the sync engine and a remote collection catalog.
//!
//! The engine depends only on [`CatalogClient`]; the HTTP implementation
//! lives in `provider-discogs`. Items travel through the engine's persisted
//! checkpoints, so [`CatalogItem`] is serializable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The requested page lies past the end of the listing
    #[error("Page {page} is outside of the valid range")]
    PageOutOfRange { page: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("API error {status_code}: {message}")]
    Api { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Folder id of the implicit "All" folder holding the whole collection
pub const ALL_FOLDER_ID: i64 = 0;

/// A user's collection folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFolder {
    pub id: i64,
    pub name: String,
    /// Number of items the catalog reports for the folder
    pub count: u64,
}

/// One collection entry, the unit of reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Catalog release id; 0 when the catalog did not supply one
    pub external_id: i64,
    #[serde(default)]
    pub instance_id: i64,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub folder_id: i64,
    #[serde(default)]
    pub date_added: Option<String>,
}

impl CatalogItem {
    pub fn has_external_id(&self) -> bool {
        self.external_id > 0
    }

    pub fn cover_url(&self) -> Option<&str> {
        self.cover_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// One page of a collection listing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionPage {
    pub items: Vec<CatalogItem>,
    /// Total items across all pages, 0 when not reported
    pub total_items: u64,
    pub page: u32,
    pub pages: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTrack {
    pub title: String,
    /// Position as listed ("A1", "2-3", "7")
    pub position: String,
    pub duration_secs: u32,
    pub track_number: u32,
    pub disc_number: u32,
    pub side: Option<String>,
}

/// Full release details, including the track listing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemDetail {
    pub external_id: i64,
    pub title: String,
    pub artist: String,
    pub year: i32,
    pub genre: Option<String>,
    pub style: Option<String>,
    pub label: Option<String>,
    pub country: Option<String>,
    pub release_date: Option<String>,
    pub cover_url: Option<String>,
    pub tracks: Vec<CatalogTrack>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Read access to a remote collection catalog
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Whether requests carry user credentials
    fn is_authenticated(&self) -> bool;

    /// Username of the authenticated account
    async fn get_identity(&self) -> CatalogResult<String>;

    async fn get_user_folders(&self, username: &str) -> CatalogResult<Vec<CatalogFolder>>;

    /// Fetch one page of a folder.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::PageOutOfRange`] when `page` is past the end.
    async fn get_user_collection_by_folder(
        &self,
        username: &str,
        folder_id: i64,
        page: u32,
        per_page: u32,
    ) -> CatalogResult<CollectionPage>;

    /// Fetch one page of the whole collection
    async fn get_user_collection(
        &self,
        username: &str,
        page: u32,
        per_page: u32,
    ) -> CatalogResult<CollectionPage>;

    async fn get_item_detail(&self, external_id: i64) -> CatalogResult<ItemDetail>;

    async fn download_cover(&self, url: &str) -> CatalogResult<CoverImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_survives_batch_serialization() {
        let item = CatalogItem {
            external_id: 249504,
            instance_id: 17,
            title: "Kind of Blue".to_string(),
            artist: "Miles Davis".to_string(),
            year: 1959,
            cover_url: Some("https://img.example/kob.jpg".to_string()),
            folder_id: 3,
            date_added: Some("2024-02-01T10:00:00-08:00".to_string()),
        };

        let json = serde_json::to_string(&vec![item.clone()]).unwrap();
        let restored: Vec<CatalogItem> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, vec![item]);
    }

    #[test]
    fn test_optional_fields_default_when_absent() {
        let restored: CatalogItem =
            serde_json::from_str(r#"{"external_id":1,"title":"T","artist":"A"}"#).unwrap();

        assert_eq!(restored.year, 0);
        assert_eq!(restored.folder_id, 0);
        assert!(restored.cover_url().is_none());
    }

    #[test]
    fn test_empty_cover_url_is_ignored() {
        let item = CatalogItem {
            external_id: 0,
            instance_id: 0,
            title: "T".to_string(),
            artist: "A".to_string(),
            year: 0,
            cover_url: Some(String::new()),
            folder_id: 0,
            date_added: None,
        };

        assert!(item.cover_url().is_none());
        assert!(!item.has_external_id());
    }
}
