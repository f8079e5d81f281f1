//! Error types for the S3 provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// S3 provider errors
#[derive(Error, Debug)]
pub enum S3Error {
    /// Client configuration was rejected
    #[error("S3 configuration error: {0}")]
    Config(String),

    /// A request failed; `operation` names the S3 call
    #[error("S3 {operation} failed for '{key}': {message}")]
    Request {
        operation: &'static str,
        key: String,
        message: String,
    },

    /// Response body could not be read
    #[error("Failed to read body of '{key}': {message}")]
    Body { key: String, message: String },
}

/// Result type for S3 operations
pub type Result<T> = std::result::Result<T, S3Error>;

impl S3Error {
    pub(crate) fn request(
        operation: &'static str,
        key: impl Into<String>,
        error: impl std::fmt::Debug,
    ) -> Self {
        S3Error::Request {
            operation,
            key: key.into(),
            message: format!("{:?}", error),
        }
    }
}

impl From<S3Error> for BridgeError {
    fn from(error: S3Error) -> Self {
        match error {
            S3Error::Config(msg) => BridgeError::NotAvailable(msg),
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
