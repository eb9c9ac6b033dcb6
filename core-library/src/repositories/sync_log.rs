//! Append-only log of per-item import failures

use crate::error::Result;
use crate::models::{NewSyncLogEntry, SyncLogEntry};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

#[async_trait]
pub trait SyncLogRepository: Send + Sync {
    async fn record(&self, entry: &NewSyncLogEntry, now: i64) -> Result<i64>;

    /// Most recent entries first
    async fn recent(&self, limit: u32) -> Result<Vec<SyncLogEntry>>;
}

pub struct SqliteSyncLogRepository {
    pool: SqlitePool,
}

impl SqliteSyncLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncLogRepository for SqliteSyncLogRepository {
    async fn record(&self, entry: &NewSyncLogEntry, now: i64) -> Result<i64> {
        let result = query(
            r#"
            INSERT INTO sync_logs (discogs_id, album_title, artist, error_type, error_msg, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.discogs_id)
        .bind(&entry.album_title)
        .bind(&entry.artist)
        .bind(entry.kind.as_str())
        .bind(&entry.message)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<SyncLogEntry>> {
        let entries = query_as::<_, SyncLogEntry>(
            r#"
            SELECT id, discogs_id, album_title, artist, error_type, error_msg, created_at
            FROM sync_logs
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
