//! Discogs API connector implementation
//!
//! Implements the `CatalogClient` trait for the Discogs REST API.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_runtime::config::{CatalogAuth, CatalogConfig};
use core_runtime::logging::redact_if_sensitive;
use core_sync::{
    CatalogClient, CatalogFolder, CatalogResult, CollectionPage, CoverImage, ItemDetail,
    RateLimiter, RequestClass, ALL_FOLDER_ID,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{DiscogsError, Result};
use crate::types::{
    CollectionReleasesResponse, ErrorResponse, FoldersResponse, IdentityResponse,
    ReleaseResponse,
};

/// Wait applied to a 429 without a usable `Retry-After`
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Consecutive 429 responses tolerated for one request
const MAX_THROTTLED_RETRIES: u32 = 5;

/// Marker in the 404 body for a page past the end of a listing
const OUT_OF_RANGE_MARKER: &str = "outside of valid range";

/// Discogs API connector
///
/// Implements `CatalogClient` on top of a host `HttpClient`.
///
/// # Features
///
/// - Personal token or OAuth 1.0a PLAINTEXT authorization
/// - Every request waits on the shared [`RateLimiter`] and feeds the
///   response's rate-limit headers back into it
/// - 429 responses honour `Retry-After` and are retried
/// - Status codes mapped onto [`core_sync::CatalogError`]
///
/// # Example
///
/// ```ignore
/// use provider_discogs::DiscogsConnector;
/// use core_sync::CatalogClient;
///
/// let connector = DiscogsConnector::new(http_client, rate_limiter, catalog_config);
/// let username = connector.get_identity().await?;
/// let folders = connector.get_user_folders(&username).await?;
/// ```
pub struct DiscogsConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// Request budget shared with the sync engine
    rate_limiter: Arc<RateLimiter>,

    config: CatalogConfig,
}

impl DiscogsConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        rate_limiter: Arc<RateLimiter>,
        config: CatalogConfig,
    ) -> Self {
        match config.auth.as_ref() {
            Some(CatalogAuth::PersonalToken(token)) => {
                debug!(token = %redact_if_sensitive("token", token), "Using personal token");
            }
            Some(CatalogAuth::OAuth(credentials)) => {
                debug!(
                    consumer_key = %redact_if_sensitive("consumer_key", &credentials.consumer_key),
                    "Using OAuth credentials"
                );
            }
            None => debug!("No Discogs credentials, using the anonymous budget"),
        }

        Self {
            http_client,
            rate_limiter,
            config,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request_class(&self) -> RequestClass {
        RequestClass::from_authenticated(self.config.has_credentials())
    }

    /// Build authorization header value
    fn auth_header(&self) -> Option<String> {
        match self.config.auth.as_ref()? {
            CatalogAuth::PersonalToken(token) => Some(format!("Discogs token={}", token.trim())),
            CatalogAuth::OAuth(credentials) => {
                let now = chrono::Utc::now();
                let nonce = now
                    .timestamp_nanos_opt()
                    .unwrap_or_else(|| now.timestamp_micros());
                Some(format!(
                    "OAuth oauth_consumer_key=\"{}\", oauth_token=\"{}\", \
                     oauth_signature_method=\"PLAINTEXT\", oauth_signature=\"{}&{}\", \
                     oauth_timestamp=\"{}\", oauth_nonce=\"{}\", oauth_version=\"1.0\"",
                    urlencoding::encode(credentials.consumer_key.trim()),
                    urlencoding::encode(credentials.access_token.trim()),
                    urlencoding::encode(credentials.consumer_secret.trim()),
                    urlencoding::encode(credentials.access_secret.trim()),
                    now.timestamp(),
                    nonce,
                ))
            }
        }
    }

    fn build_request(&self, url: &str, accept: &str) -> HttpRequest {
        let mut request = HttpRequest::get(url)
            .user_agent(self.config.user_agent.clone())
            .header("Accept", accept)
            .timeout(Duration::from_secs(self.config.request_timeout_secs));

        if let Some(authorization) = self.auth_header() {
            request = request.header("Authorization", authorization);
        }
        request
    }

    /// Execute one API call under the rate limiter.
    ///
    /// Waits for budget, sends, records the rate-limit headers, and on 429
    /// sleeps out `Retry-After` before trying again. Only successful calls
    /// are charged against the budget.
    #[instrument(skip(self), fields(url = %url))]
    async fn send(&self, url: &str, accept: &str) -> Result<HttpResponse> {
        let class = self.request_class();
        let mut throttled = 0;

        loop {
            self.rate_limiter.wait(class).await;

            let response = self
                .http_client
                .execute(self.build_request(url, accept))
                .await
                .map_err(|e| {
                    if e.is_transport() {
                        warn!(error = %e, "Discogs request did not reach the server");
                    }
                    DiscogsError::from(e)
                })?;
            self.rate_limiter.update_from_headers(&response.headers).await;

            if response.is_rate_limited() {
                let retry_after = response
                    .header("Retry-After")
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

                throttled += 1;
                if throttled > MAX_THROTTLED_RETRIES {
                    warn!(attempts = throttled, "Still rate limited, giving up");
                    return Err(DiscogsError::RateLimitExceeded {
                        retry_after_seconds: retry_after,
                    });
                }

                warn!(
                    retry_after,
                    attempt = throttled,
                    auth_remaining = ?response.header("X-Discogs-Ratelimit-Auth-Remaining"),
                    "Rate limited by Discogs, waiting for reset"
                );
                self.rate_limiter
                    .wait_for_reset(i64::try_from(retry_after).unwrap_or(i64::MAX))
                    .await;
                continue;
            }

            if !response.is_success() {
                return Err(Self::status_error(&response));
            }

            self.rate_limiter.decrement(class).await;
            debug!(status = response.status, "API request succeeded");
            return Ok(response);
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(url, "application/json").await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| DiscogsError::ParseError(format!("{}: {}", url, e)))
    }

    fn status_error(response: &HttpResponse) -> DiscogsError {
        let message = serde_json::from_slice::<ErrorResponse>(&response.body)
            .map(|body| body.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).trim().to_string());

        match response.status {
            401 | 403 => DiscogsError::AuthenticationFailed {
                status_code: response.status,
                message,
            },
            404 if message.contains(OUT_OF_RANGE_MARKER) => {
                DiscogsError::PageOutOfRange { page: 0 }
            }
            404 => DiscogsError::NotFound(message),
            status_code => DiscogsError::ApiError {
                status_code,
                message,
            },
        }
    }

    async fn fetch_folder_page(
        &self,
        username: &str,
        folder_id: i64,
        page: u32,
        per_page: u32,
    ) -> Result<CollectionPage> {
        let url = self.api_url(&format!(
            "/users/{}/collection/folders/{}/releases?page={}&per_page={}",
            urlencoding::encode(username),
            folder_id,
            page,
            per_page.clamp(1, 100)
        ));

        let response: CollectionReleasesResponse =
            self.get_json(&url).await.map_err(|e| match e {
                DiscogsError::PageOutOfRange { .. } => DiscogsError::PageOutOfRange { page },
                other => other,
            })?;

        let page = response.into_page(folder_id, page);
        debug!(
            folder_id,
            page = page.page,
            items = page.items.len(),
            total = page.total_items,
            "Fetched collection page"
        );
        Ok(page)
    }
}

#[async_trait]
impl CatalogClient for DiscogsConnector {
    fn is_authenticated(&self) -> bool {
        self.config.has_credentials()
    }

    #[instrument(skip(self))]
    async fn get_identity(&self) -> CatalogResult<String> {
        let identity: IdentityResponse = self.get_json(&self.api_url("/oauth/identity")).await?;
        info!(username = %identity.username, "Fetched Discogs identity");
        Ok(identity.username)
    }

    #[instrument(skip(self))]
    async fn get_user_folders(&self, username: &str) -> CatalogResult<Vec<CatalogFolder>> {
        let url = self.api_url(&format!(
            "/users/{}/collection/folders",
            urlencoding::encode(username)
        ));
        let response: FoldersResponse = self.get_json(&url).await?;

        let folders: Vec<CatalogFolder> = response.folders.into_iter().map(Into::into).collect();
        info!("Listed {} collection folders", folders.len());
        Ok(folders)
    }

    #[instrument(skip(self))]
    async fn get_user_collection_by_folder(
        &self,
        username: &str,
        folder_id: i64,
        page: u32,
        per_page: u32,
    ) -> CatalogResult<CollectionPage> {
        Ok(self
            .fetch_folder_page(username, folder_id, page, per_page)
            .await?)
    }

    #[instrument(skip(self))]
    async fn get_user_collection(
        &self,
        username: &str,
        page: u32,
        per_page: u32,
    ) -> CatalogResult<CollectionPage> {
        Ok(self
            .fetch_folder_page(username, ALL_FOLDER_ID, page, per_page)
            .await?)
    }

    #[instrument(skip(self))]
    async fn get_item_detail(&self, external_id: i64) -> CatalogResult<ItemDetail> {
        let url = self.api_url(&format!("/releases/{}", external_id));
        let release: ReleaseResponse = self.get_json(&url).await?;

        let detail = release.into_detail();
        debug!(
            title = %detail.title,
            tracks = detail.tracks.len(),
            "Fetched release details"
        );
        Ok(detail)
    }

    #[instrument(skip(self))]
    async fn download_cover(&self, url: &str) -> CatalogResult<CoverImage> {
        let response = self.send(url, "image/*").await?;

        let content_type = response
            .header("Content-Type")
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_lowercase());

        match content_type {
            Some(content_type) if content_type.starts_with("image/") => {
                debug!(bytes = response.body.len(), %content_type, "Downloaded cover");
                Ok(CoverImage {
                    data: response.body.to_vec(),
                    content_type,
                })
            }
            other => Err(DiscogsError::NotAnImage(other).into()),
        }
    }
}
