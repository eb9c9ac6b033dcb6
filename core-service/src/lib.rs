//! Core service façade and bootstrap helpers.
//!
//! This crate wires a validated [`CoreConfig`] into the running engine: it
//! opens the library database, builds the repositories, the shared rate
//! limiter and the Discogs connector, and hands them to the
//! [`SyncCoordinator`]. Desktop hosts enable the `desktop-shims` feature to
//! get the reqwest-backed `HttpClient` by default.
//!
//! ```ignore
//! use core_service::CoreService;
//! use core_sync::StartRequest;
//!
//! let core = CoreService::builder()
//!     .database_path("/path/to/crates.db")
//!     .catalog(CatalogConfig::default().with_env_auth())
//!     .build()
//!     .await?;
//!
//! core.sync().start(StartRequest::all_folders()).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::{Clock, HttpClient};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{
    AlbumRepository, AppSettings, SettingsRepository, SqliteAlbumRepository,
    SqliteSettingsRepository, SqliteSyncLogRepository, SyncLogRepository,
};
use core_runtime::config::{CatalogConfig, CoreConfig, CoreConfigBuilder};
use core_runtime::logging::strip_path;
use core_sync::{
    CatalogClient, RateLimiter, SqliteProgressStore, SyncConfig, SyncCoordinator,
    SyncDependencies,
};
use provider_discogs::DiscogsConnector;
use sqlx::SqlitePool;
use tracing::{info, warn};

const IN_MEMORY_PATH: &str = ":memory:";

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: CoreConfig,
    pool: SqlitePool,
    albums: Arc<dyn AlbumRepository>,
    sync_log: Arc<dyn SyncLogRepository>,
    settings: Arc<dyn SettingsRepository>,
    rate_limiter: Arc<RateLimiter>,
    sync: Arc<SyncCoordinator>,
}

impl CoreService {
    pub fn builder() -> CoreServiceBuilder {
        CoreServiceBuilder::default()
    }

    /// Bootstrap the engine from a validated configuration.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        CoreServiceBuilder::default().build_with(config).await
    }

    /// Control surface of the collection sync
    pub fn sync(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.sync)
    }

    pub fn albums(&self) -> Arc<dyn AlbumRepository> {
        Arc::clone(&self.albums)
    }

    /// Per-item failures recorded by past runs
    pub fn sync_log(&self) -> Arc<dyn SyncLogRepository> {
        Arc::clone(&self.sync_log)
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub async fn settings(&self) -> Result<AppSettings> {
        Ok(self.settings.load().await?)
    }

    /// Stop any running sync, keeping its checkpoint, and close the database.
    pub async fn shutdown(&self) {
        if self.sync.is_sync_active().await {
            if let Err(e) = self.sync.pause().await {
                warn!(error = %e, "Failed to pause sync during shutdown");
            }
        }
        self.pool.close().await;
        info!("Core service shut down");
    }
}

/// Builder for [`CoreService`].
///
/// Collects the [`CoreConfig`] settings and optional overrides for the sync
/// tuning and the catalog client.
#[derive(Default)]
pub struct CoreServiceBuilder {
    config: CoreConfigBuilder,
    sync_config: Option<SyncConfig>,
    catalog_client: Option<Arc<dyn CatalogClient>>,
}

impl CoreServiceBuilder {
    /// Library database file; `":memory:"` for a throwaway database.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config = self.config.database_path(path);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.config = self.config.http_client(client);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.config = self.config.clock(clock);
        self
    }

    pub fn catalog(mut self, catalog: CatalogConfig) -> Self {
        self.config = self.config.catalog(catalog);
        self
    }

    pub fn sync_batch_size(mut self, size: u32) -> Self {
        self.config = self.config.sync_batch_size(size);
        self
    }

    /// Replace the default sync pacing and retry settings.
    ///
    /// The batch size still comes from the core configuration.
    pub fn sync_config(mut self, sync_config: SyncConfig) -> Self {
        self.sync_config = Some(sync_config);
        self
    }

    /// Use `client` instead of the Discogs connector.
    pub fn catalog_client(mut self, client: Arc<dyn CatalogClient>) -> Self {
        self.catalog_client = Some(client);
        self
    }

    pub async fn build(mut self) -> Result<CoreService> {
        let config = std::mem::take(&mut self.config).build()?;
        self.build_with(config).await
    }

    async fn build_with(self, config: CoreConfig) -> Result<CoreService> {
        let pool = create_pool(database_config(&config.database_path)).await?;

        let albums: Arc<dyn AlbumRepository> = Arc::new(SqliteAlbumRepository::new(pool.clone()));
        let sync_log: Arc<dyn SyncLogRepository> =
            Arc::new(SqliteSyncLogRepository::new(pool.clone()));
        let settings: Arc<dyn SettingsRepository> =
            Arc::new(SqliteSettingsRepository::new(pool.clone()));

        let rate_limiter = Arc::new(RateLimiter::new());
        let catalog: Arc<dyn CatalogClient> = match self.catalog_client {
            Some(client) => client,
            None => Arc::new(DiscogsConnector::new(
                Arc::clone(&config.http_client),
                Arc::clone(&rate_limiter),
                config.catalog.clone(),
            )),
        };

        let sync_config = self
            .sync_config
            .unwrap_or_default()
            .with_batch_size(config.sync_batch_size);

        let progress = SqliteProgressStore::new(pool.clone(), Arc::clone(&config.clock))
            .with_max_age(
                sync_config.progress_max_age,
                sync_config.paused_progress_max_age,
            );

        let deps = SyncDependencies {
            catalog,
            rate_limiter: Arc::clone(&rate_limiter),
            progress: Arc::new(progress),
            albums: Arc::clone(&albums),
            sync_log: Arc::clone(&sync_log),
            settings: Arc::clone(&settings),
            clock: Arc::clone(&config.clock),
        };

        let sync = SyncCoordinator::new(sync_config, deps)
            .with_username(config.catalog.username.clone());

        let database_path = config.database_path.to_string_lossy();
        info!(
            database = %strip_path(&database_path),
            authenticated = config.catalog.has_credentials(),
            "Core service initialized"
        );

        Ok(CoreService {
            config,
            pool,
            albums,
            sync_log,
            settings,
            rate_limiter,
            sync: Arc::new(sync),
        })
    }
}

fn database_config(path: &Path) -> DatabaseConfig {
    if path.as_os_str() == IN_MEMORY_PATH {
        DatabaseConfig::in_memory()
    } else {
        DatabaseConfig::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpRequest, HttpResponse};
    use core_sync::{StartRequest, SyncStatus};

    struct OfflineHttpClient;

    #[async_trait]
    impl HttpClient for OfflineHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(503, "offline"))
        }
    }

    fn builder() -> CoreServiceBuilder {
        CoreService::builder()
            .database_path(IN_MEMORY_PATH)
            .http_client(Arc::new(OfflineHttpClient))
    }

    #[tokio::test]
    async fn test_missing_database_path_is_a_configuration_error() {
        let err = CoreService::builder()
            .http_client(Arc::new(OfflineHttpClient))
            .build()
            .await
            .err()
            .unwrap();

        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_bootstraps_empty_library() {
        let core = builder().build().await.unwrap();

        assert_eq!(core.albums().count().await.unwrap(), 0);
        assert_eq!(core.settings().await.unwrap(), AppSettings::default());
        assert_eq!(core.sync().status().await, SyncStatus::Idle);
        assert!(core.sync().history(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_without_credentials_is_rejected() {
        let core = builder().build().await.unwrap();

        let err = core
            .sync()
            .start(StartRequest::all_folders())
            .await
            .unwrap_err();

        assert!(CoreError::from(err).is_configuration());
        assert_eq!(core.sync().status().await, SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_batch_size_is_validated() {
        let err = builder().sync_batch_size(500).build().await.err().unwrap();
        assert!(matches!(err, CoreError::Runtime(_)));
    }

    #[test]
    fn test_in_memory_path_selects_single_connection_pool() {
        assert!(database_config(Path::new(IN_MEMORY_PATH)).is_in_memory());
        assert!(!database_config(Path::new("/tmp/crates.db")).is_in_memory());
    }
}
