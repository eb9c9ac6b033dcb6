//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations.
//!
//! - Traits define the interface the sync engine depends on
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>`
//!
//! ## Available Repositories
//!
//! - `AlbumRepository` - Albums and their track listings
//! - `SyncLogRepository` - Per-item import failures
//! - `SettingsRepository` - Sync selection and last-sync timestamp

pub mod album;
pub mod settings;
pub mod sync_log;

pub use album::{AlbumRepository, SqliteAlbumRepository};
pub use settings::{SettingsRepository, SqliteSettingsRepository};
pub use sync_log::{SqliteSyncLogRepository, SyncLogRepository};
