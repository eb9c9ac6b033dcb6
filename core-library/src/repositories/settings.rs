//! Single-row application settings touched by the sync engine

use crate::error::Result;
use crate::models::AppSettings;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load(&self) -> Result<AppSettings>;

    /// Remember the mode and folder of the most recent start
    async fn record_sync_selection(&self, mode: &str, folder_id: i64, now: i64) -> Result<()>;

    /// Stamp the time of the last naturally completed run
    async fn mark_synced(&self, at: i64) -> Result<()>;
}

pub struct SqliteSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for SqliteSettingsRepository {
    async fn load(&self) -> Result<AppSettings> {
        let settings = query_as::<_, AppSettings>(
            "SELECT sync_mode, sync_folder_id, last_sync_at FROM app_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings.unwrap_or_default())
    }

    async fn record_sync_selection(&self, mode: &str, folder_id: i64, now: i64) -> Result<()> {
        query(
            r#"
            INSERT INTO app_config (id, sync_mode, sync_folder_id, updated_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                sync_mode = excluded.sync_mode,
                sync_folder_id = excluded.sync_folder_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(mode)
        .bind(folder_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_synced(&self, at: i64) -> Result<()> {
        query(
            r#"
            INSERT INTO app_config (id, last_sync_at, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                last_sync_at = excluded.last_sync_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(at)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_defaults_before_first_write() {
        let repo = SqliteSettingsRepository::new(create_test_pool().await.unwrap());
        assert_eq!(repo.load().await.unwrap(), AppSettings::default());
    }

    #[tokio::test]
    async fn test_selection_and_last_sync_are_independent() {
        let repo = SqliteSettingsRepository::new(create_test_pool().await.unwrap());

        repo.record_sync_selection("specific", 7, 100).await.unwrap();
        repo.mark_synced(200).await.unwrap();
        repo.record_sync_selection("all-folders", 0, 300).await.unwrap();

        let settings = repo.load().await.unwrap();
        assert_eq!(settings.sync_mode.as_deref(), Some("all-folders"));
        assert_eq!(settings.sync_folder_id, 0);
        assert_eq!(settings.last_sync_at, Some(200));
    }
}
