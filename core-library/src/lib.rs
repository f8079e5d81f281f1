//! # Photo Catalogue Module
//!
//! Owns the tenant-scoped photo catalogue database and provides repository
//! patterns for data access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - Catalogue rows with typed conflict payloads
//! - Unique-constraint races surfaced as [`WriteOutcome`](repositories::WriteOutcome)
//! - The append-only sync run history

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
