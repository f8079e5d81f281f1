use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] bridge_traits::BridgeError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),
}

impl CoreError {
    /// True when the failure came from a cancelled upload.
    pub fn is_abort(&self) -> bool {
        matches!(self, CoreError::Sync(e) if e.is_abort())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
