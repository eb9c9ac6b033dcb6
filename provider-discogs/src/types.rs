//! Discogs API response types
//!
//! Data structures for deserializing Discogs API responses, and their
//! mapping onto the catalog types the sync engine consumes.

use core_sync::{CatalogFolder, CatalogItem, CatalogTrack, CollectionPage, ItemDetail};
use serde::Deserialize;

/// `GET /oauth/identity`
#[derive(Debug, Deserialize)]
pub struct IdentityResponse {
    pub username: String,
}

/// `GET /users/{username}/collection/folders`
#[derive(Debug, Deserialize)]
pub struct FoldersResponse {
    #[serde(default)]
    pub folders: Vec<FolderResource>,
}

#[derive(Debug, Deserialize)]
pub struct FolderResource {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

impl From<FolderResource> for CatalogFolder {
    fn from(folder: FolderResource) -> Self {
        CatalogFolder {
            id: folder.id,
            name: folder.name,
            count: folder.count,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub per_page: u32,
    /// Total items across all pages
    #[serde(default)]
    pub items: u64,
}

/// `GET /users/{username}/collection/folders/{folder_id}/releases`
#[derive(Debug, Deserialize)]
pub struct CollectionReleasesResponse {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub releases: Vec<CollectionRelease>,
}

impl CollectionReleasesResponse {
    /// Convert into a page, stamping every item with `folder_id`.
    pub fn into_page(self, folder_id: i64, page: u32) -> CollectionPage {
        let items = self
            .releases
            .into_iter()
            .map(|release| release.into_item(folder_id))
            .collect();

        CollectionPage {
            items,
            total_items: self.pagination.items,
            page: if self.pagination.page > 0 {
                self.pagination.page
            } else {
                page
            },
            pages: self.pagination.pages,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CollectionRelease {
    /// Release id
    pub id: i64,
    #[serde(default)]
    pub instance_id: i64,
    #[serde(default)]
    pub date_added: Option<String>,
    pub basic_information: BasicInformation,
}

impl CollectionRelease {
    pub fn into_item(self, folder_id: i64) -> CatalogItem {
        let info = self.basic_information;
        let cover_url = info
            .images
            .first()
            .map(|image| image.uri.clone())
            .or(info.cover_image)
            .filter(|url| !url.is_empty());

        CatalogItem {
            external_id: self.id,
            instance_id: self.instance_id,
            title: info.title,
            artist: first_artist(&info.artists),
            year: info.year,
            cover_url,
            folder_id,
            date_added: self.date_added,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BasicInformation {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub images: Vec<ImageResource>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageResource {
    /// "primary" or "secondary"
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub uri: String,
}

/// `GET /releases/{release_id}`
#[derive(Debug, Deserialize)]
pub struct ReleaseResponse {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub labels: Vec<LabelRef>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub released: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageResource>,
    #[serde(default)]
    pub tracklist: Vec<TracklistEntry>,
}

impl ReleaseResponse {
    pub fn into_detail(self) -> ItemDetail {
        let cover_url = self
            .images
            .iter()
            .find(|image| image.kind == "primary")
            .or_else(|| self.images.first())
            .map(|image| image.uri.clone())
            .filter(|url| !url.is_empty());

        let style = (!self.styles.is_empty()).then(|| self.styles.join(", "));

        ItemDetail {
            external_id: self.id,
            artist: first_artist(&self.artists),
            title: self.title,
            year: self.year,
            genre: self.genres.into_iter().next(),
            style,
            label: self.labels.into_iter().next().map(|label| label.name),
            country: self.country.filter(|c| !c.is_empty()),
            release_date: self.released.filter(|r| !r.is_empty()),
            cover_url,
            tracks: parse_tracklist(&self.tracklist),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracklistEntry {
    #[serde(default)]
    pub position: String,
    /// "track", "heading" or "index"
    #[serde(rename = "type_", default = "default_entry_type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration: String,
}

fn default_entry_type() -> String {
    "track".to_string()
}

/// Error body returned with non-2xx responses
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

fn first_artist(artists: &[ArtistRef]) -> String {
    artists
        .first()
        .map(|artist| artist.name.clone())
        .unwrap_or_default()
}

/// Keep real tracks with a title and number them in listing order.
pub fn parse_tracklist(entries: &[TracklistEntry]) -> Vec<CatalogTrack> {
    entries
        .iter()
        .filter(|entry| entry.kind == "track" && !entry.title.trim().is_empty())
        .enumerate()
        .map(|(index, entry)| {
            let position = parse_position(&entry.position);
            CatalogTrack {
                title: entry.title.trim().to_string(),
                position: entry.position.trim().to_string(),
                duration_secs: parse_duration(&entry.duration),
                track_number: index as u32 + 1,
                disc_number: position.disc_number,
                side: position.side,
            }
        })
        .collect()
}

/// "m:ss" or "h:mm:ss" to seconds; anything else is 0.
pub fn parse_duration(duration: &str) -> u32 {
    let parts: Vec<&str> = duration.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return 0;
    }

    parts
        .iter()
        .try_fold(0u32, |total, part| {
            let value: u32 = part.trim().parse().ok()?;
            total.checked_mul(60)?.checked_add(value)
        })
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPosition {
    pub disc_number: u32,
    /// Vinyl side letter
    pub side: Option<String>,
}

/// Disc and side from a listing position.
///
/// Vinyl sides pair up onto discs (A/B, C/D, E/F); "2-5" style positions
/// name the disc directly. Everything else is disc 1.
pub fn parse_position(position: &str) -> TrackPosition {
    let position = position.trim();

    if let Some(letter) = position.chars().next().filter(char::is_ascii_uppercase) {
        let disc_number = match letter {
            'A' | 'B' => 1,
            'C' | 'D' => 2,
            'E' | 'F' => 3,
            _ => 1,
        };
        return TrackPosition {
            disc_number,
            side: Some(letter.to_string()),
        };
    }

    if let Some((disc, _)) = position.split_once('-') {
        if let Ok(disc_number) = disc.trim().parse::<u32>() {
            if disc_number > 0 {
                return TrackPosition {
                    disc_number,
                    side: None,
                };
            }
        }
    }

    TrackPosition {
        disc_number: 1,
        side: None,
    }
}
