//! Domain models for the photo catalogue
//!
//! This module contains the catalogue row, its typed conflict state, the
//! manifest payload produced by the manifest builder and the sync-run audit
//! record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Provider tag for rows that intentionally have no backing object.
pub const DATABASE_ONLY_PROVIDER: &str = "database-only";

/// Current manifest schema version.
pub const MANIFEST_VERSION: &str = "v1";

// =============================================================================
// ID Types
// =============================================================================

/// Tenant scope for every catalogue operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Fresh catalogue row identifier.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Sync state
// =============================================================================

/// Row synchronization status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Conflict,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Conflict => "conflict",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "conflict" => Ok(SyncStatus::Conflict),
            other => Err(format!("unknown sync status '{}'", other)),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of conflict recorded on a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictType {
    /// Row exists but its storage object is gone
    MissingInStorage,
    /// Storage metadata drifted from the row and content could not be proven equal
    MetadataMismatch,
    /// Another storage object resolved to this row's photo id
    PhotoIdConflict,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::MissingInStorage => "missing-in-storage",
            ConflictType::MetadataMismatch => "metadata-mismatch",
            ConflictType::PhotoIdConflict => "photo-id-conflict",
        }
    }

    /// Human-readable reason stored alongside the payload.
    pub fn default_reason(&self) -> &'static str {
        match self {
            ConflictType::MissingInStorage => "Storage object no longer exists",
            ConflictType::MetadataMismatch => "Storage metadata differs from catalogue",
            ConflictType::PhotoIdConflict => "Another storage object resolved to this photo id",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(size, etag, lastModified)` plus the derived hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSnapshot {
    pub size: Option<i64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub metadata_hash: Option<String>,
}

/// Typed conflict state. Written once and replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPayload {
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_snapshot: Option<MetadataSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_snapshot: Option<MetadataSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming_storage_key: Option<String>,
}

impl ConflictPayload {
    pub fn missing_in_storage(record_snapshot: MetadataSnapshot) -> Self {
        Self {
            conflict_type: ConflictType::MissingInStorage,
            storage_snapshot: None,
            record_snapshot: Some(record_snapshot),
            incoming_storage_key: None,
        }
    }

    pub fn metadata_mismatch(
        storage_snapshot: MetadataSnapshot,
        record_snapshot: MetadataSnapshot,
    ) -> Self {
        Self {
            conflict_type: ConflictType::MetadataMismatch,
            storage_snapshot: Some(storage_snapshot),
            record_snapshot: Some(record_snapshot),
            incoming_storage_key: None,
        }
    }

    pub fn photo_id_conflict(
        incoming_snapshot: MetadataSnapshot,
        record_snapshot: MetadataSnapshot,
        incoming_storage_key: impl Into<String>,
    ) -> Self {
        Self {
            conflict_type: ConflictType::PhotoIdConflict,
            storage_snapshot: Some(incoming_snapshot),
            record_snapshot: Some(record_snapshot),
            incoming_storage_key: Some(incoming_storage_key.into()),
        }
    }

    /// Same conflict type, same storage-side hash and same incoming key.
    pub fn is_equivalent(&self, other: &ConflictPayload) -> bool {
        self.conflict_type == other.conflict_type
            && self.incoming_storage_key == other.incoming_storage_key
            && self.storage_snapshot.as_ref().map(|s| &s.metadata_hash)
                == other.storage_snapshot.as_ref().map(|s| &s.metadata_hash)
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// Companion video of a Live Photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePhotoVideo {
    pub key: String,
    #[serde(default)]
    pub size: Option<i64>,
}

/// Structured description of one processed photo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    /// Stable photo id
    pub id: String,
    pub storage_key: String,
    /// SHA-256 content digest, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_photo: Option<LivePhotoVideo>,
    /// Builder-specific fields (EXIF, thumbnails) carried through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Versioned manifest envelope stored on each row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub data: ManifestItem,
}

impl Manifest {
    pub fn new(data: ManifestItem) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            data,
        }
    }
}

// =============================================================================
// Catalogue record
// =============================================================================

/// One catalogue row per asset, scoped by tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueRecord {
    pub id: String,
    pub tenant_id: TenantId,
    pub photo_id: String,
    pub storage_key: String,
    pub storage_provider: String,
    pub manifest: Manifest,
    pub size: Option<i64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub metadata_hash: Option<String>,
    pub sync_status: SyncStatus,
    pub conflict_reason: Option<String>,
    pub conflict_payload: Option<ConflictPayload>,
    pub synced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CatalogueRecord {
    /// New synced row whose identity comes from the manifest.
    pub fn new(
        tenant_id: TenantId,
        storage_provider: impl Into<String>,
        manifest: Manifest,
        snapshot: &MetadataSnapshot,
        now: i64,
    ) -> Self {
        let mut record = Self {
            id: new_record_id(),
            tenant_id,
            photo_id: manifest.data.id.clone(),
            storage_key: manifest.data.storage_key.clone(),
            storage_provider: storage_provider.into(),
            manifest,
            size: None,
            etag: None,
            last_modified: None,
            metadata_hash: None,
            sync_status: SyncStatus::Synced,
            conflict_reason: None,
            conflict_payload: None,
            synced_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        record.apply_snapshot(snapshot);
        record
    }

    pub fn is_database_only(&self) -> bool {
        self.storage_provider == DATABASE_ONLY_PROVIDER
    }

    pub fn is_conflicted(&self) -> bool {
        self.sync_status == SyncStatus::Conflict
    }

    pub fn conflict_type(&self) -> Option<ConflictType> {
        self.conflict_payload.as_ref().map(|p| p.conflict_type)
    }

    /// Stored snapshot fields.
    pub fn snapshot(&self) -> MetadataSnapshot {
        MetadataSnapshot {
            size: self.size,
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
            metadata_hash: self.metadata_hash.clone(),
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &MetadataSnapshot) {
        self.size = snapshot.size;
        self.etag = snapshot.etag.clone();
        self.last_modified = snapshot.last_modified.clone();
        self.metadata_hash = snapshot.metadata_hash.clone();
    }

    /// Transition to `synced`, clearing any conflict.
    pub fn mark_synced(&mut self, now: i64) {
        self.sync_status = SyncStatus::Synced;
        self.conflict_reason = None;
        self.conflict_payload = None;
        self.synced_at = Some(now);
        self.updated_at = now;
    }

    /// Transition to `conflict` with the given payload.
    pub fn mark_conflict(&mut self, payload: ConflictPayload, now: i64) {
        self.sync_status = SyncStatus::Conflict;
        self.conflict_reason = Some(payload.conflict_type.default_reason().to_string());
        self.conflict_payload = Some(payload);
        self.updated_at = now;
    }

    /// Check row invariants before a write.
    pub fn validate(&self) -> Result<(), String> {
        if self.tenant_id.as_str().is_empty() {
            return Err("tenant_id cannot be empty".to_string());
        }
        if self.photo_id.trim().is_empty() {
            return Err("photo_id cannot be empty".to_string());
        }
        if self.storage_key.trim().is_empty() {
            return Err("storage_key cannot be empty".to_string());
        }
        if self.is_conflicted() != self.conflict_payload.is_some() {
            return Err(format!(
                "sync_status '{}' is inconsistent with conflict payload presence",
                self.sync_status
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Sync runs
// =============================================================================

/// Per-run action counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub inserted: u32,
    pub updated: u32,
    pub deleted: u32,
    pub conflicts: u32,
    pub errors: u32,
    pub skipped: u32,
}

impl RunSummary {
    pub fn total(&self) -> u32 {
        self.inserted + self.updated + self.deleted + self.conflicts + self.errors + self.skipped
    }
}

/// Append-only audit row, one per reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunRecord {
    pub id: String,
    pub tenant_id: TenantId,
    pub dry_run: bool,
    pub summary: RunSummary,
    pub actions_count: i64,
    pub started_at: i64,
    pub completed_at: i64,
}

impl SyncRunRecord {
    pub fn new(
        tenant_id: TenantId,
        dry_run: bool,
        summary: RunSummary,
        actions_count: usize,
        started_at: i64,
        completed_at: i64,
    ) -> Self {
        Self {
            id: new_record_id(),
            tenant_id,
            dry_run,
            summary,
            actions_count: actions_count as i64,
            started_at,
            completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(id: &str, key: &str) -> Manifest {
        Manifest::new(ManifestItem {
            id: id.to_string(),
            storage_key: key.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_sync_status_round_trip_str() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Conflict] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_conflict_payload_wire_shape() {
        let payload = ConflictPayload::photo_id_conflict(
            MetadataSnapshot::default(),
            MetadataSnapshot::default(),
            "b.jpg",
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "photo-id-conflict");
        assert_eq!(json["incomingStorageKey"], "b.jpg");
        assert!(json.get("storageSnapshot").is_some());
    }

    #[test]
    fn test_record_state_transitions_keep_invariant() {
        let mut record = CatalogueRecord::new(
            TenantId::new("t1"),
            "s3",
            manifest("p1", "a.jpg"),
            &MetadataSnapshot {
                size: Some(3),
                ..Default::default()
            },
            10,
        );
        assert_eq!(record.photo_id, "p1");
        assert_eq!(record.storage_key, "a.jpg");
        assert_eq!(record.size, Some(3));
        assert!(record.validate().is_ok());

        record.mark_conflict(ConflictPayload::missing_in_storage(record.snapshot()), 20);
        assert!(record.is_conflicted());
        assert_eq!(record.conflict_type(), Some(ConflictType::MissingInStorage));
        assert!(record.conflict_reason.is_some());
        assert!(record.validate().is_ok());

        record.mark_synced(30);
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert!(record.conflict_payload.is_none());
        assert_eq!(record.synced_at, Some(30));
        assert!(record.validate().is_ok());

        record.sync_status = SyncStatus::Conflict;
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_payload_equivalence_ignores_record_side() {
        let storage = MetadataSnapshot {
            metadata_hash: Some("e::1::t".to_string()),
            ..Default::default()
        };
        let a = ConflictPayload::metadata_mismatch(storage.clone(), MetadataSnapshot::default());
        let b = ConflictPayload::metadata_mismatch(
            storage,
            MetadataSnapshot {
                size: Some(9),
                ..Default::default()
            },
        );
        assert!(a.is_equivalent(&b));

        let c = ConflictPayload::missing_in_storage(MetadataSnapshot::default());
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_manifest_item_keeps_extra_fields() {
        let json = r#"{"id":"p1","storageKey":"a.jpg","exif":{"iso":100}}"#;
        let item: ManifestItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.extra["exif"]["iso"], 100);
        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["exif"]["iso"], 100);
    }
}
