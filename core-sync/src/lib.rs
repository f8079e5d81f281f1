//! # Photo Sync Module
//!
//! Reconciles a tenant's photo catalogue with its storage backend and
//! allocates identities for uploads.
//!
//! ## Overview
//!
//! This module manages:
//! - Metadata fingerprints for cheap drift detection (`snapshot`)
//! - The single-pass diff between storage and catalogue (`planner`)
//! - The four reconciliation stages and their progress events (`coordinator`, `progress`)
//! - Manual conflict resolution (`conflict_resolver`)
//! - Upload key allocation and the upload pipeline (`upload`, `uploader`)
//!
//! ## Components
//!
//! - **Sync Coordinator** (`coordinator`): import, orphan flagging, metadata resolution, status reconciliation
//! - **Conflict Resolver** (`conflict_resolver`): prefer-storage / prefer-database per conflict type
//! - **Manifest Builder** (`manifest`): content digest and photo id for a storage object
//! - **Upload Key Allocator** (`upload`): in-memory, deterministic key and id planning

pub mod action;
pub mod conflict_resolver;
pub mod coordinator;
pub mod error;
pub mod manifest;
pub mod planner;
pub mod progress;
mod race;
pub mod snapshot;
pub mod upload;
pub mod uploader;

#[cfg(test)]
mod test_support;

pub use action::{ActionSnapshots, ActionType, SyncAction};
pub use conflict_resolver::{ConflictResolver, ResolutionStrategy};
pub use coordinator::{SyncCoordinator, SyncOptions, SyncRunResult};
pub use error::{Result, SyncError};
pub use manifest::{DigestManifestBuilder, ManifestBuilder};
pub use planner::{MatchedItem, ReconciliationPlan, StageTotals};
pub use progress::{
    LogContext, ProgressEmitter, ProgressLogLevel, StageStatus, SyncProgressEvent, SyncStage,
};
pub use snapshot::metadata_hash;
pub use upload::{UploadFile, UploadKeyAllocator, UploadPlan};
pub use uploader::{UploadCoordinator, UploadReport};
