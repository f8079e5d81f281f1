//! # GitHub Provider
//!
//! Implements `StorageProvider` trait for a GitHub repository.
//!
//! ## Overview
//!
//! This module provides:
//! - Recursive listing from the git trees API, with blob SHAs as etags
//! - Raw downloads and base64 uploads through the contents API
//! - SHA-guarded updates and deletes on the configured branch
//! - `raw.githubusercontent.com` public URLs

pub mod connector;
pub mod error;
pub mod types;

pub use connector::GitHubConnector;
pub use error::{GitHubError, Result};
