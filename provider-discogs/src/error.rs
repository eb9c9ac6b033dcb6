//! Error types for the Discogs provider

use core_sync::CatalogError;
use thiserror::Error;

/// Discogs provider errors
#[derive(Error, Debug)]
pub enum DiscogsError {
    /// Credentials missing, invalid or revoked
    #[error("Authentication failed (status {status_code}): {message}")]
    AuthenticationFailed { status_code: u16, message: String },

    /// A collection page past the last one was requested
    #[error("Page {page} is outside of valid range")]
    PageOutOfRange { page: u32 },

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Still throttled after retrying
    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    /// API request returned an error
    #[error("Discogs API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Not an image (content type {0:?})")]
    NotAnImage(Option<String>),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] bridge_traits::error::BridgeError),
}

/// Result type for Discogs operations
pub type Result<T> = std::result::Result<T, DiscogsError>;

impl From<DiscogsError> for CatalogError {
    fn from(error: DiscogsError) -> Self {
        match error {
            DiscogsError::AuthenticationFailed {
                status_code,
                message,
            } => CatalogError::Unauthorized(format!("status {}: {}", status_code, message)),
            DiscogsError::PageOutOfRange { page } => CatalogError::PageOutOfRange { page },
            DiscogsError::NotFound(resource) => CatalogError::NotFound(resource),
            DiscogsError::RateLimitExceeded {
                retry_after_seconds,
            } => CatalogError::RateLimited {
                retry_after_secs: retry_after_seconds,
            },
            DiscogsError::ApiError {
                status_code,
                message,
            } => CatalogError::Api {
                status_code,
                message,
            },
            DiscogsError::ParseError(msg) => CatalogError::Parse(msg),
            DiscogsError::NotAnImage(content_type) => CatalogError::Parse(format!(
                "Cover download returned {}",
                content_type.as_deref().unwrap_or("no content type")
            )),
            DiscogsError::BridgeError(e) => CatalogError::Network(e.to_string()),
        }
    }
}
