//! # Reconciliation Planner
//!
//! Single full diff between one storage listing and the tenant's catalogue.
//!
//! ## Overview
//!
//! The plan is computed once per run and split into four disjoint partitions:
//!
//! - `missing_in_db`: objects whose key has no catalogue row
//! - `orphan_in_db`: rows whose key is absent from the listing
//! - `metadata_conflicts`: rows whose stored hash differs from storage
//! - `status_reconciliation`: rows with a matching hash but a stale status
//!
//! Keys are compared as exact strings. Rows with the `database-only`
//! provider are never orphans.

use crate::snapshot::snapshot_of;
use bridge_traits::StorageObject;
use core_library::models::{CatalogueRecord, ConflictType, MetadataSnapshot, SyncStatus};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A row paired with the object currently stored under its key.
#[derive(Debug, Clone)]
pub struct MatchedItem {
    pub record: CatalogueRecord,
    pub object: StorageObject,
    pub storage_snapshot: MetadataSnapshot,
}

/// Partition sizes, reported in the `start` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTotals {
    #[serde(rename = "missing-in-db")]
    pub missing_in_db: usize,
    #[serde(rename = "orphan-in-db")]
    pub orphan_in_db: usize,
    #[serde(rename = "metadata-conflicts")]
    pub metadata_conflicts: usize,
    #[serde(rename = "status-reconciliation")]
    pub status_reconciliation: usize,
}

/// The four partitions of one run
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    pub missing_in_db: Vec<StorageObject>,
    pub orphan_in_db: Vec<CatalogueRecord>,
    pub metadata_conflicts: Vec<MatchedItem>,
    pub status_reconciliation: Vec<MatchedItem>,
}

impl ReconciliationPlan {
    /// Diff `objects` against `records`.
    ///
    /// Listing order is preserved for `missing_in_db`; row partitions follow
    /// the order of `records`. Duplicate listing keys keep the first entry.
    pub fn build(objects: &[StorageObject], records: &[CatalogueRecord]) -> Self {
        let mut listing: HashMap<&str, &StorageObject> = HashMap::with_capacity(objects.len());
        let mut ordered_keys = Vec::with_capacity(objects.len());
        for object in objects {
            if !listing.contains_key(object.key.as_str()) {
                listing.insert(object.key.as_str(), object);
                ordered_keys.push(object.key.as_str());
            }
        }

        let known_keys: HashSet<&str> = records.iter().map(|r| r.storage_key.as_str()).collect();

        // Objects already parked on an open photo-id conflict wait for manual
        // resolution instead of being re-imported every run.
        let parked_keys: HashSet<&str> = records
            .iter()
            .filter(|r| r.is_conflicted())
            .filter_map(|r| r.conflict_payload.as_ref())
            .filter(|p| p.conflict_type == ConflictType::PhotoIdConflict)
            .filter_map(|p| p.incoming_storage_key.as_deref())
            .collect();

        let missing_in_db = ordered_keys
            .iter()
            .filter(|key| !known_keys.contains(*key) && !parked_keys.contains(*key))
            .filter_map(|key| listing.get(key).map(|o| (*o).clone()))
            .collect();

        let mut plan = Self {
            missing_in_db,
            ..Default::default()
        };

        for record in records {
            let Some(object) = listing.get(record.storage_key.as_str()) else {
                if !record.is_database_only() {
                    plan.orphan_in_db.push(record.clone());
                }
                continue;
            };

            let storage_snapshot = snapshot_of(object);
            let item = MatchedItem {
                record: record.clone(),
                object: (*object).clone(),
                storage_snapshot,
            };

            if item.storage_snapshot.metadata_hash != record.metadata_hash {
                plan.metadata_conflicts.push(item);
            } else if record.sync_status != SyncStatus::Synced
                && record.conflict_type() != Some(ConflictType::PhotoIdConflict)
            {
                plan.status_reconciliation.push(item);
            }
        }

        plan
    }

    pub fn totals(&self) -> StageTotals {
        StageTotals {
            missing_in_db: self.missing_in_db.len(),
            orphan_in_db: self.orphan_in_db.len(),
            metadata_conflicts: self.metadata_conflicts.len(),
            status_reconciliation: self.status_reconciliation.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing_in_db.is_empty()
            && self.orphan_in_db.is_empty()
            && self.metadata_conflicts.is_empty()
            && self.status_reconciliation.is_empty()
    }
}
