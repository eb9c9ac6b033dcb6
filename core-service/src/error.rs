use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),
}

impl CoreError {
    /// Whether the host has to fix its setup before retrying.
    pub fn is_configuration(&self) -> bool {
        match self {
            CoreError::Runtime(e) => e.is_configuration(),
            CoreError::Sync(e) => e.is_configuration(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
