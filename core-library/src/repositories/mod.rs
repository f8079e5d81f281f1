//! # Repository Pattern Implementation
//!
//! Repository traits and SQLite implementations for the photo catalogue.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - Every query is scoped by tenant
//!
//! ## Available Repositories
//!
//! - `PhotoAssetRepository` - Catalogue rows with typed conflict state
//! - `SyncRunRepository` - Append-only reconciliation audit trail

pub mod photo_asset;
pub mod sync_run;

pub use photo_asset::{
    PhotoAssetRepository, SqlitePhotoAssetRepository, UniqueConflict, WriteOutcome,
};
pub use sync_run::{SqliteSyncRunRepository, SyncRunRepository};
