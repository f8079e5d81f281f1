//! # Host Bridge Traits
//!
//! Backend abstraction traits consumed by the reconciliation core.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync engine and the concrete
//! storage backends. Each trait represents a capability that the core requires
//! but that is implemented once per backend or host.
//!
//! ## Traits
//!
//! ### Storage
//! - [`StorageProvider`](storage::StorageProvider) - List, fetch, upload, delete and move objects
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations for REST-backed providers
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Backends
//!
//! | Backend | Implementation Crate |
//! |---------|---------------------|
//! | S3 / B2 | `provider-s3`       |
//! | GitHub  | `provider-github`   |
//! | Local / Eagle | `provider-local` |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Backend
//! implementations should convert their SDK errors to `BridgeError` and keep
//! the failing key in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so a single provider handle
//! can be shared across async tasks for the duration of a run.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{MoveOptions, StorageObject, StorageProvider, UploadOptions};
pub use time::{Clock, FixedClock, SystemClock};
