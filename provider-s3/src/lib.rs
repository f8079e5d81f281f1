//! # S3 Provider
//!
//! Implements `StorageProvider` for S3-compatible buckets.
//!
//! ## Overview
//!
//! This crate provides:
//! - Paginated listing with `ListObjectsV2`, scoped to the configured prefix
//! - Downloads that report a missing key as `None`
//! - Uploads followed by `HeadObject` so callers get the stored metadata
//! - Server-side moves with `CopyObject` + `DeleteObject`
//! - Public URLs from a configured base or the bucket's virtual-host address
//!
//! Backblaze B2 is served by the same connector through its S3-compatible
//! endpoint, selected with [`S3Flavor::B2`].

pub mod connector;
pub mod error;

pub use connector::{S3Connector, S3Flavor, S3Target};
pub use error::{Result, S3Error};
