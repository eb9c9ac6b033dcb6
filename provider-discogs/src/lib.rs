//! # Discogs Provider
//!
//! Implements `CatalogClient` for the Discogs REST API.
//!
//! ## Overview
//!
//! This module provides:
//! - Personal-token and OAuth 1.0a (PLAINTEXT) authentication
//! - Folder listing and paged collection reads
//! - Release details with track listing parsing
//! - Cover image downloads
//! - Request pacing through the shared `RateLimiter`, fed by the
//!   `X-Discogs-Ratelimit-*` response headers, and 429 back-off

pub mod connector;
pub mod error;
pub mod types;

pub use connector::DiscogsConnector;
pub use error::{DiscogsError, Result};
