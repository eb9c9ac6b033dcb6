//! # Collection Sync Module
//!
//! Mirrors a remote record collection into the local library.
//!
//! ## Overview
//!
//! This module manages the lifecycle of a sync run, including:
//! - Paging through the user's collection folder by folder
//! - Staying inside the catalog API's per-minute request budget
//! - Reconciling every catalog item with the local album table
//! - Checkpointing after each item so a run survives pause, crash and restart
//! - Archiving finished runs into the sync history
//!
//! ## Components
//!
//! - **Catalog** (`catalog`): The `CatalogClient` boundary and its data types
//! - **Rate Limiter** (`rate_limiter`): Sliding request budget fed by response headers
//! - **State** (`state`): Process-wide run state with validated status transitions
//! - **Progress** (`progress`): Persisted checkpoints and run history
//! - **Reconciler** (`reconciler`): Match, create or update one album per item
//! - **Worker** (`worker`): Background page/batch loop of a single run
//! - **Sync Coordinator** (`coordinator`): Start, pause, resume, cancel and progress

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod progress;
pub mod rate_limiter;
pub mod reconciler;
pub mod state;
pub mod worker;

pub use catalog::{
    CatalogClient, CatalogError, CatalogFolder, CatalogItem, CatalogResult, CatalogTrack,
    CollectionPage, CoverImage, ItemDetail, ALL_FOLDER_ID,
};
pub use config::SyncConfig;
pub use coordinator::{
    ProgressSnapshot, SavedProgress, StartOutcome, StartRequest, SyncCoordinator,
    SyncDependencies,
};
pub use error::{Result, SyncError};
pub use progress::{ProgressStatus, ProgressStore, SqliteProgressStore, SyncHistory, SyncProgress};
pub use rate_limiter::{RateLimitStatus, RateLimiter, RateLimiterConfig, RequestClass};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use state::{RunId, SyncMode, SyncState, SyncStateManager, SyncStatus};
pub use worker::{SyncContext, SyncWorker};
