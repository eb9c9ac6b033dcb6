//! # Core Configuration Module
//!
//! Configuration management for the collection sync engine.
//!
//! ## Overview
//!
//! A builder constructs a [`CoreConfig`] holding the host bridges and the
//! settings the engine needs. `build()` validates fail-fast so a broken
//! configuration never reaches the sync worker.
//!
//! ## Required Settings
//!
//! - `database_path` - SQLite database holding the library and sync state
//!
//! ## Optional Settings (with defaults)
//!
//! - `HttpClient` - desktop default: reqwest (requires `desktop-shims`)
//! - `Clock` - default: [`SystemClock`]
//! - [`CatalogConfig`] - API base URL, user agent, username and credentials
//! - `sync_batch_size` - items requested per collection page (default 50)
//!
//! Missing catalog credentials are not a build error: the library is still
//! usable, and the sync coordinator rejects `start` until credentials exist.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CatalogAuth, CatalogConfig, CoreConfig};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/crates.db")
//!     .catalog(
//!         CatalogConfig::default()
//!             .with_username("digger")
//!             .with_auth(CatalogAuth::PersonalToken("abc123".into())),
//!     )
//!     .sync_batch_size(100)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;

/// Default Discogs API endpoint.
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://api.discogs.com";

/// Default user agent sent to the catalog API.
pub const DEFAULT_USER_AGENT: &str = concat!("CrateSync/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_SYNC_BATCH_SIZE: u32 = 50;
pub const MAX_SYNC_BATCH_SIZE: u32 = 100;

/// OAuth 1.0a credentials obtained through the (external) token exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("consumer_key", &"[REDACTED]")
            .field("consumer_secret", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("access_secret", &"[REDACTED]")
            .finish()
    }
}

/// How requests to the catalog API are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum CatalogAuth {
    /// Personal access token from the account's developer settings
    PersonalToken(String),
    /// OAuth 1.0a access token signed with PLAINTEXT
    OAuth(OAuthCredentials),
}

impl std::fmt::Debug for CatalogAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogAuth::PersonalToken(_) => f.write_str("PersonalToken([REDACTED])"),
            CatalogAuth::OAuth(credentials) => f.debug_tuple("OAuth").field(credentials).finish(),
        }
    }
}

impl CatalogAuth {
    /// Read credentials from the environment.
    ///
    /// `DISCOGS_TOKEN` wins over the OAuth quartet (`DISCOGS_CONSUMER_KEY`,
    /// `DISCOGS_CONSUMER_SECRET`, `DISCOGS_ACCESS_TOKEN`,
    /// `DISCOGS_ACCESS_SECRET`). Returns `None` when neither is complete.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = non_empty("DISCOGS_TOKEN") {
            return Some(CatalogAuth::PersonalToken(token));
        }

        Some(CatalogAuth::OAuth(OAuthCredentials {
            consumer_key: non_empty("DISCOGS_CONSUMER_KEY")?,
            consumer_secret: non_empty("DISCOGS_CONSUMER_SECRET")?,
            access_token: non_empty("DISCOGS_ACCESS_TOKEN")?,
            access_secret: non_empty("DISCOGS_ACCESS_SECRET")?,
        }))
    }

    fn validate(&self) -> Result<()> {
        match self {
            CatalogAuth::PersonalToken(token) if token.trim().is_empty() => Err(Error::Config(
                "Catalog personal token cannot be empty".to_string(),
            )),
            CatalogAuth::OAuth(credentials)
                if credentials.consumer_key.is_empty()
                    || credentials.consumer_secret.is_empty()
                    || credentials.access_token.is_empty()
                    || credentials.access_secret.is_empty() =>
            {
                Err(Error::Config(
                    "Catalog OAuth credentials require consumer key/secret and access token/secret"
                        .to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Settings for the remote catalog API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub base_url: String,
    /// The API rejects requests without an identifying user agent
    pub user_agent: String,
    /// Account whose collection is synced; resolved via the identity
    /// endpoint when absent
    pub username: Option<String>,
    pub auth: Option<CatalogAuth>,
    pub request_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            username: None,
            auth: None,
            request_timeout_secs: 30,
        }
    }
}

impl CatalogConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_auth(mut self, auth: CatalogAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Fill credentials from the environment when none were set explicitly.
    pub fn with_env_auth(mut self) -> Self {
        if self.auth.is_none() {
            self.auth = CatalogAuth::from_env();
        }
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.auth.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "Catalog base URL must be http(s): {}",
                self.base_url
            )));
        }

        if self.user_agent.trim().is_empty() {
            return Err(Error::Config(
                "Catalog user agent cannot be empty".to_string(),
            ));
        }

        if let Some(username) = &self.username {
            if username.trim().is_empty() {
                return Err(Error::Config(
                    "Catalog username cannot be blank when provided".to_string(),
                ));
            }
        }

        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(Error::Config(
                "Catalog request timeout must be between 1 and 300 seconds".to_string(),
            ));
        }

        if let Some(auth) = &self.auth {
            auth.validate()?;
        }

        Ok(())
    }
}

/// Core configuration for the sync engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// HTTP client for catalog requests
    pub http_client: Arc<dyn HttpClient>,

    /// Wall-clock source for timestamps and staleness checks
    pub clock: Arc<dyn Clock>,

    pub catalog: CatalogConfig,

    /// Items requested per collection page
    pub sync_batch_size: u32,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("http_client", &"HttpClient { ... }")
            .field("clock", &"Clock { ... }")
            .field("catalog", &self.catalog)
            .field("sync_batch_size", &self.sync_batch_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.sync_batch_size == 0 {
            return Err(Error::Config(
                "Sync batch size must be greater than 0".to_string(),
            ));
        }

        if self.sync_batch_size > MAX_SYNC_BATCH_SIZE {
            return Err(Error::Config(format!(
                "Sync batch size exceeds the API page maximum of {}",
                MAX_SYNC_BATCH_SIZE
            )));
        }

        self.catalog.validate()
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(catalog: &CatalogConfig) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;
    use std::time::Duration;

    let client = ReqwestHttpClient::with_timeout(Duration::from_secs(catalog.request_timeout_secs))
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_catalog: &CatalogConfig) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Tests: inject a mock HttpClient."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    catalog: Option<CatalogConfig>,
    sync_batch_size: Option<u32>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/crates.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn catalog(mut self, catalog: CatalogConfig) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Items requested per collection page (1..=100).
    pub fn sync_batch_size(mut self, size: u32) -> Self {
        self.sync_batch_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the database path is missing or a value is
    ///   out of range
    /// - [`Error::CapabilityMissing`] when no HTTP client is available
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let catalog = self.catalog.unwrap_or_default();

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&catalog)?,
        };

        let config = CoreConfig {
            database_path,
            http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            catalog,
            sync_batch_size: self.sync_batch_size.unwrap_or(DEFAULT_SYNC_BATCH_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpRequest, HttpResponse};
    use std::collections::HashMap;

    struct NoopHttpClient;

    #[async_trait]
    impl HttpClient for NoopHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(200, ""))
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder().http_client(Arc::new(NoopHttpClient))
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = builder().build();

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database path is required"));
    }

    #[test]
    fn test_builder_applies_defaults() {
        let config = builder().database_path("/tmp/crates.db").build().unwrap();

        assert_eq!(config.sync_batch_size, DEFAULT_SYNC_BATCH_SIZE);
        assert_eq!(config.catalog.base_url, DEFAULT_CATALOG_BASE_URL);
        assert!(config.catalog.user_agent.starts_with("CrateSync/"));
        assert!(!config.catalog.has_credentials());
    }

    #[test]
    fn test_validate_rejects_batch_size_out_of_range() {
        let zero = builder()
            .database_path("/tmp/crates.db")
            .sync_batch_size(0)
            .build();
        assert!(matches!(zero, Err(Error::Config(_))));

        let too_big = builder()
            .database_path("/tmp/crates.db")
            .sync_batch_size(MAX_SYNC_BATCH_SIZE + 1)
            .build();
        assert!(matches!(too_big, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_token() {
        let result = builder()
            .database_path("/tmp/crates.db")
            .catalog(CatalogConfig::default().with_auth(CatalogAuth::PersonalToken("  ".into())))
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("personal token")));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let result = builder()
            .database_path("/tmp/crates.db")
            .catalog(CatalogConfig::default().with_base_url("ftp://api.discogs.com"))
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_auth_from_lookup_prefers_personal_token() {
        let env: HashMap<&str, &str> = [
            ("DISCOGS_TOKEN", "personal"),
            ("DISCOGS_CONSUMER_KEY", "ck"),
        ]
        .into_iter()
        .collect();

        let auth = CatalogAuth::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(auth, Some(CatalogAuth::PersonalToken("personal".into())));
    }

    #[test]
    fn test_auth_from_lookup_requires_complete_oauth() {
        let partial: HashMap<&str, &str> = [
            ("DISCOGS_CONSUMER_KEY", "ck"),
            ("DISCOGS_CONSUMER_SECRET", "cs"),
            ("DISCOGS_ACCESS_TOKEN", "at"),
        ]
        .into_iter()
        .collect();
        assert!(CatalogAuth::from_lookup(|key| partial.get(key).map(|v| v.to_string())).is_none());

        let mut complete = partial.clone();
        complete.insert("DISCOGS_ACCESS_SECRET", "as");
        let auth = CatalogAuth::from_lookup(|key| complete.get(key).map(|v| v.to_string()));
        assert!(matches!(auth, Some(CatalogAuth::OAuth(ref c)) if c.access_secret == "as"));
    }

    #[test]
    fn test_debug_output_redacts_credentials() {
        let config = builder()
            .database_path("/tmp/crates.db")
            .catalog(CatalogConfig::default().with_auth(CatalogAuth::PersonalToken(
                "super-secret".into(),
            )))
            .build()
            .unwrap();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = builder().database_path("/tmp/crates.db").build().unwrap();
        let cloned = config.clone();
        assert_eq!(config.database_path, cloned.database_path);
    }
}
