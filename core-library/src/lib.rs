//! # Library Management Module
//!
//! Owns the local record collection database and provides repository
//! patterns for data access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pool and embedded migrations (including the tables the
//!   sync engine checkpoints into)
//! - Album and track storage with atomic album+tracklist creation
//! - The per-item sync failure log and application settings

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{
    Album, AlbumPatch, AppSettings, CoverArt, NewAlbum, NewSyncLogEntry, NewTrack, SyncLogEntry,
    SyncLogKind, Track,
};
pub use repositories::{
    AlbumRepository, SettingsRepository, SqliteAlbumRepository, SqliteSettingsRepository,
    SqliteSyncLogRepository, SyncLogRepository,
};
