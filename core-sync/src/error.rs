use bridge_traits::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed request, rejected before any I/O
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    /// Operation not permitted in the row's current state
    #[error("State conflict on {id}: {reason}")]
    StateConflict { id: String, reason: String },

    #[error("Quota exceeded: {quota} limit is {limit}, requested {requested}")]
    QuotaExceeded {
        quota: String,
        limit: u64,
        requested: u64,
    },

    #[error("Storage object {key} is {size} bytes, limit is {limit}")]
    ObjectTooLarge { key: String, size: u64, limit: u64 },

    #[error("Provider error: {0}")]
    Provider(#[from] BridgeError),

    #[error("Manifest build failed for {key}: {message}")]
    ManifestBuild { key: String, message: String },

    /// Cooperative cancellation, never counted as an item error
    #[error("Operation aborted")]
    Aborted,

    #[error("Catalogue error: {0}")]
    Library(#[from] LibraryError),
}

impl SyncError {
    pub fn is_abort(&self) -> bool {
        matches!(self, SyncError::Aborted)
    }

    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        SyncError::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    pub fn state_conflict(id: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::StateConflict {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
