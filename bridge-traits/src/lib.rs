//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync engine and the host that
//! embeds it. Each trait represents a capability the engine requires but that
//! is provided differently per host (desktop binary, test harness).
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry and TLS
//! - [`Clock`](time::Clock) - Wall-clock time source for deterministic testing
//!
//! ## Fail-Fast Strategy
//!
//! The engine fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! let http_client = builder.http_client
//!     .ok_or_else(|| CoreError::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "No HTTP client implementation provided. \
//!                  Desktop: ensure default feature is enabled.".to_string()
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Host
//! implementations convert their native errors to `BridgeError` and keep the
//! failure context (URL, status) in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so the sync worker can share them
//! across tasks.

pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{Clock, LogLevel, ManualClock, SystemClock};
