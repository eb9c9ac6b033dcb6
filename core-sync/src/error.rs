use crate::catalog::CatalogError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("A sync is already running")]
    AlreadyRunning,

    #[error("No sync is running")]
    NotRunning,

    #[error("Sync is not paused")]
    NotPaused,

    #[error("No saved progress to resume")]
    NothingToResume,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Failed to fetch page {page} of folder {folder_id}: {source}")]
    PageFetch {
        folder_id: i64,
        page: u32,
        #[source]
        source: CatalogError,
    },

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid sync status: {0}")]
    InvalidStatus(String),

    #[error("Invalid sync mode: {0}")]
    InvalidSyncMode(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Whether the run can never begin until the caller fixes its setup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration(_) | SyncError::Catalog(CatalogError::Unauthorized(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
