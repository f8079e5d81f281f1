//! Error types for GitHub provider

use thiserror::Error;

/// GitHub provider errors
#[derive(Error, Debug)]
pub enum GitHubError {
    /// API request returned an error
    #[error("GitHub API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Rate limit exceeded
    #[error("GitHub rate limit exceeded: {0}")]
    RateLimited(String),

    /// Tree listing was cut off by the API
    #[error("Repository tree for '{branch}' is truncated; narrow the configured path")]
    TruncatedTree { branch: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] bridge_traits::error::BridgeError),
}

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, GitHubError>;

impl From<GitHubError> for bridge_traits::error::BridgeError {
    fn from(error: GitHubError) -> Self {
        match error {
            GitHubError::BridgeError(e) => e,
            other => bridge_traits::error::BridgeError::OperationFailed(other.to_string()),
        }
    }
}
