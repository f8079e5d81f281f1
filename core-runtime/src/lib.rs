//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the photo sync core:
//! - Logging and tracing infrastructure
//! - Configuration management (database, storage backend, quotas)
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions and the validated configuration
//! that selects a storage backend for each run.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CoreConfig, QuotaConfig, StorageConfig};
pub use error::{Error, Result};
