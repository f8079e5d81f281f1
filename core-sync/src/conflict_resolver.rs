//! Manual Conflict Resolution
//!
//! Resolves one conflicted catalogue row with an operator-chosen strategy.
//!
//! ## Overview
//!
//! | conflict | prefer-storage | prefer-database |
//! |---|---|---|
//! | missing-in-storage | delete the row | keep it as `database-only` |
//! | metadata-mismatch | rebuild the manifest from storage | keep the manifest, adopt the storage snapshot |
//! | photo-id-conflict | rebuild the row from the incoming object | keep the row, drop the incoming object |
//!
//! Every branch honours `dry_run` and returns the same [`SyncAction`] shape
//! with `applied = false` and no writes. Backend failures are surfaced to the
//! caller, unlike the per-item handling of a sync run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::conflict_resolver::{ConflictResolver, ResolutionStrategy};
//!
//! let resolver = ConflictResolver::new(provider, "s3", catalogue);
//! let preview = resolver
//!     .resolve_conflict(&tenant, &row_id, ResolutionStrategy::PreferStorage, true)
//!     .await?;
//! assert!(!preview.applied);
//! ```

use crate::action::{ActionType, SyncAction};
use crate::error::{Result, SyncError};
use crate::manifest::{DigestManifestBuilder, ManifestBuilder};
use crate::snapshot::snapshot_of;
use bridge_traits::{Clock, StorageObject, StorageProvider, SystemClock};
use core_library::models::{
    CatalogueRecord, ConflictPayload, ConflictType, Manifest, MetadataSnapshot, TenantId,
    DATABASE_ONLY_PROVIDER,
};
use core_library::repositories::{PhotoAssetRepository, WriteOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};

/// Which side wins a manual resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    PreferStorage,
    PreferDatabase,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::PreferStorage => "prefer-storage",
            ResolutionStrategy::PreferDatabase => "prefer-database",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prefer-storage" => Ok(ResolutionStrategy::PreferStorage),
            "prefer-database" => Ok(ResolutionStrategy::PreferDatabase),
            other => Err(SyncError::Validation(format!(
                "unknown resolution strategy '{}'",
                other
            ))),
        }
    }
}

/// Applies manual resolutions to conflicted rows
pub struct ConflictResolver {
    provider: Arc<dyn StorageProvider>,
    provider_tag: String,
    catalogue: Arc<dyn PhotoAssetRepository>,
    manifest_builder: Arc<dyn ManifestBuilder>,
    clock: Arc<dyn Clock>,
}

impl ConflictResolver {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        provider_tag: impl Into<String>,
        catalogue: Arc<dyn PhotoAssetRepository>,
    ) -> Self {
        Self {
            provider,
            provider_tag: provider_tag.into(),
            catalogue,
            manifest_builder: Arc::new(DigestManifestBuilder::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_manifest_builder(mut self, builder: Arc<dyn ManifestBuilder>) -> Self {
        self.manifest_builder = builder;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Resolve the conflict stored on row `conflict_id`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the row does not exist
    /// - `StateConflict` if the row is not in conflict, the payload lacks the
    ///   data the strategy needs, or the rewrite hits a unique constraint
    /// - `NotFound` for the incoming key if a photo-id conflict's incoming
    ///   object was deleted since detection; the conflict is left in place
    /// - `Provider` / `ManifestBuild` for backend failures
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn resolve_conflict(
        &self,
        tenant: &TenantId,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        dry_run: bool,
    ) -> Result<SyncAction> {
        let record = self
            .catalogue
            .find_by_id(tenant, conflict_id)
            .await?
            .ok_or_else(|| SyncError::not_found("conflict", conflict_id))?;

        let payload = match (&record.conflict_payload, record.is_conflicted()) {
            (Some(payload), true) => payload.clone(),
            _ => {
                return Err(SyncError::state_conflict(
                    conflict_id,
                    format!("row is {} and has no open conflict", record.sync_status),
                ))
            }
        };

        let action = match (payload.conflict_type, strategy) {
            (ConflictType::MissingInStorage, ResolutionStrategy::PreferStorage) => {
                self.delete_orphan(tenant, &record, dry_run).await?
            }
            (ConflictType::MissingInStorage, ResolutionStrategy::PreferDatabase) => {
                let mut updated = record.clone();
                updated.storage_provider = DATABASE_ONLY_PROVIDER.to_string();
                self.write_resolution(&record, updated, dry_run).await?;
                base_action(ActionType::Update, &record, &record.storage_key, !dry_run)
                    .with_reason("kept as database-only")
            }
            (ConflictType::MetadataMismatch, ResolutionStrategy::PreferStorage) => {
                self.rebuild_from_storage(&record, dry_run).await?
            }
            (ConflictType::MetadataMismatch, ResolutionStrategy::PreferDatabase) => {
                let storage = required_storage_snapshot(&record, &payload)?;
                let mut updated = record.clone();
                updated.apply_snapshot(&storage);
                self.write_resolution(&record, updated, dry_run).await?;
                base_action(ActionType::Update, &record, &record.storage_key, !dry_run)
                    .with_reason("kept catalogue manifest")
                    .with_after(storage)
            }
            (ConflictType::PhotoIdConflict, ResolutionStrategy::PreferStorage) => {
                self.adopt_incoming(&record, &payload, dry_run).await?
            }
            (ConflictType::PhotoIdConflict, ResolutionStrategy::PreferDatabase) => {
                self.write_resolution(&record, record.clone(), dry_run)
                    .await?;
                base_action(ActionType::Update, &record, &record.storage_key, !dry_run)
                    .with_reason("kept existing row, incoming object discarded")
            }
        };

        info!(
            conflict_id,
            conflict = %payload.conflict_type,
            %strategy,
            dry_run,
            "Conflict resolved"
        );
        Ok(action.with_conflict(&record.id, payload))
    }

    async fn delete_orphan(
        &self,
        tenant: &TenantId,
        record: &CatalogueRecord,
        dry_run: bool,
    ) -> Result<SyncAction> {
        if !dry_run && !self.catalogue.delete(tenant, &record.id).await? {
            return Err(SyncError::not_found("conflict", &record.id));
        }
        Ok(
            base_action(ActionType::Delete, record, &record.storage_key, !dry_run)
                .with_reason("storage object gone, row deleted"),
        )
    }

    async fn rebuild_from_storage(
        &self,
        record: &CatalogueRecord,
        dry_run: bool,
    ) -> Result<SyncAction> {
        let (object, video) = self.current_object(&record.storage_key).await?;
        let storage = snapshot_of(&object);
        let action = base_action(ActionType::Update, record, &record.storage_key, !dry_run)
            .with_reason("manifest rebuilt from storage")
            .with_after(storage.clone());
        if dry_run {
            return Ok(action);
        }

        let mut item = self
            .manifest_builder
            .build(self.provider.as_ref(), &object, video.as_ref())
            .await?;
        item.id = record.photo_id.clone();

        let mut updated = record.clone();
        updated.manifest = Manifest::new(item);
        updated.apply_snapshot(&storage);
        self.write_resolution(record, updated.clone(), false).await?;
        Ok(action.with_manifest_after(updated.manifest))
    }

    async fn adopt_incoming(
        &self,
        record: &CatalogueRecord,
        payload: &ConflictPayload,
        dry_run: bool,
    ) -> Result<SyncAction> {
        let incoming_key = payload.incoming_storage_key.clone().ok_or_else(|| {
            SyncError::state_conflict(&record.id, "photo-id conflict has no incoming storage key")
        })?;
        let (object, video) = self.current_object(&incoming_key).await?;
        let incoming = snapshot_of(&object);
        let action = base_action(ActionType::Update, record, &incoming_key, !dry_run)
            .with_reason("row rebuilt from incoming object")
            .with_after(incoming.clone());
        if dry_run {
            return Ok(action);
        }

        let item = self
            .manifest_builder
            .build(self.provider.as_ref(), &object, video.as_ref())
            .await?;

        let mut updated = record.clone();
        updated.photo_id = item.id.clone();
        updated.storage_key = incoming_key;
        updated.storage_provider = self.provider_tag.clone();
        updated.manifest = Manifest::new(item);
        updated.apply_snapshot(&incoming);
        self.write_resolution(record, updated.clone(), false).await?;
        Ok(action
            .with_photo_id(&updated.photo_id)
            .with_manifest_after(updated.manifest))
    }

    /// Listing entry for `key` as storage reports it now, with its paired
    /// Live Photo video.
    async fn current_object(&self, key: &str) -> Result<(StorageObject, Option<StorageObject>)> {
        let objects = self.provider.list_all_files(None).await?;
        let video = self.provider.detect_live_photos(&objects).remove(key);
        let object = objects
            .into_iter()
            .find(|o| o.key == key)
            .ok_or_else(|| SyncError::not_found("storage object", key))?;
        Ok((object, video))
    }

    /// Clear the conflict on `updated` and persist it.
    async fn write_resolution(
        &self,
        original: &CatalogueRecord,
        mut updated: CatalogueRecord,
        dry_run: bool,
    ) -> Result<()> {
        if dry_run {
            return Ok(());
        }
        updated.mark_synced(self.clock.unix_timestamp_millis());
        match self.catalogue.update(&updated).await? {
            WriteOutcome::Applied => Ok(()),
            WriteOutcome::ConflictDetected(kind) => Err(SyncError::state_conflict(
                &original.id,
                format!("resolution collides with another row on {:?}", kind),
            )),
        }
    }
}

fn base_action(
    action_type: ActionType,
    record: &CatalogueRecord,
    storage_key: &str,
    applied: bool,
) -> SyncAction {
    SyncAction::new(action_type, storage_key, applied)
        .with_photo_id(&record.photo_id)
        .with_before(record.snapshot())
        .with_manifest_before(record.manifest.clone())
}

fn required_storage_snapshot(
    record: &CatalogueRecord,
    payload: &ConflictPayload,
) -> Result<MetadataSnapshot> {
    payload
        .storage_snapshot
        .clone()
        .ok_or_else(|| SyncError::state_conflict(&record.id, "conflict payload has no storage snapshot"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryProvider;
    use bridge_traits::FixedClock;
    use core_library::db::create_test_pool;
    use core_library::models::{ManifestItem, SyncStatus};
    use core_library::repositories::SqlitePhotoAssetRepository;

    async fn setup() -> (Arc<MemoryProvider>, Arc<SqlitePhotoAssetRepository>, ConflictResolver) {
        let provider = Arc::new(MemoryProvider::default());
        let catalogue = Arc::new(SqlitePhotoAssetRepository::new(create_test_pool().await.unwrap()));
        let resolver = ConflictResolver::new(provider.clone(), "s3", catalogue.clone())
            .with_clock(Arc::new(FixedClock::at_millis(5_000)));
        (provider, catalogue, resolver)
    }

    fn tenant() -> TenantId {
        TenantId::new("t1")
    }

    async fn insert_row(
        catalogue: &SqlitePhotoAssetRepository,
        key: &str,
        photo_id: &str,
        payload: Option<ConflictPayload>,
    ) -> CatalogueRecord {
        let manifest = Manifest::new(ManifestItem {
            id: photo_id.to_string(),
            storage_key: key.to_string(),
            digest: Some("old-digest".to_string()),
            ..Default::default()
        });
        let snapshot = MetadataSnapshot {
            size: Some(1),
            etag: Some("old".to_string()),
            last_modified: None,
            metadata_hash: Some("old::1::".to_string()),
        };
        let mut record = CatalogueRecord::new(tenant(), "s3", manifest, &snapshot, 1);
        if let Some(payload) = payload {
            record.mark_conflict(payload, 2);
        }
        catalogue.insert(&record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn test_rejects_unknown_and_unconflicted_rows() {
        let (_, catalogue, resolver) = setup().await;
        let err = resolver
            .resolve_conflict(&tenant(), "nope", ResolutionStrategy::PreferStorage, false)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));

        let row = insert_row(&catalogue, "a.jpg", "a", None).await;
        let err = resolver
            .resolve_conflict(&tenant(), &row.id, ResolutionStrategy::PreferDatabase, false)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_missing_in_storage_prefer_storage_deletes() {
        let (_, catalogue, resolver) = setup().await;
        let row = insert_row(
            &catalogue,
            "x.jpg",
            "x",
            Some(ConflictPayload::missing_in_storage(MetadataSnapshot::default())),
        )
        .await;

        let preview = resolver
            .resolve_conflict(&tenant(), &row.id, ResolutionStrategy::PreferStorage, true)
            .await
            .unwrap();
        assert_eq!(preview.action_type, ActionType::Delete);
        assert!(!preview.applied);
        assert!(catalogue.find_by_id(&tenant(), &row.id).await.unwrap().is_some());

        let action = resolver
            .resolve_conflict(&tenant(), &row.id, ResolutionStrategy::PreferStorage, false)
            .await
            .unwrap();
        assert!(action.applied);
        assert!(catalogue.find_by_id(&tenant(), &row.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_in_storage_prefer_database_keeps_row() {
        let (_, catalogue, resolver) = setup().await;
        let row = insert_row(
            &catalogue,
            "x.jpg",
            "x",
            Some(ConflictPayload::missing_in_storage(MetadataSnapshot::default())),
        )
        .await;

        resolver
            .resolve_conflict(&tenant(), &row.id, ResolutionStrategy::PreferDatabase, false)
            .await
            .unwrap();

        let stored = catalogue.find_by_id(&tenant(), &row.id).await.unwrap().unwrap();
        assert!(stored.is_database_only());
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert!(stored.conflict_payload.is_none());
    }

    #[tokio::test]
    async fn test_metadata_mismatch_prefer_storage_rebuilds_manifest() {
        let (provider, catalogue, resolver) = setup().await;
        provider.put("a.jpg", b"new bytes").await;
        let listed = provider.list_all_files(None).await.unwrap();
        let storage = snapshot_of(&listed[0]);
        let row = insert_row(
            &catalogue,
            "a.jpg",
            "a",
            Some(ConflictPayload::metadata_mismatch(storage.clone(), MetadataSnapshot::default())),
        )
        .await;

        let action = resolver
            .resolve_conflict(&tenant(), &row.id, ResolutionStrategy::PreferStorage, false)
            .await
            .unwrap();
        assert!(action.manifest_after.is_some());

        let stored = catalogue.find_by_id(&tenant(), &row.id).await.unwrap().unwrap();
        assert_eq!(stored.photo_id, "a");
        assert_eq!(
            stored.manifest.data.digest.as_deref(),
            Some(crate::manifest::content_digest(b"new bytes").as_str())
        );
        assert_eq!(stored.metadata_hash, storage.metadata_hash);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_photo_id_prefer_storage_adopts_incoming() {
        let (provider, catalogue, resolver) = setup().await;
        provider.put("b.jpg", b"incoming").await;
        let listed = provider.list_all_files(None).await.unwrap();
        let row = insert_row(
            &catalogue,
            "a.jpg",
            "a",
            Some(ConflictPayload::photo_id_conflict(
                snapshot_of(&listed[0]),
                MetadataSnapshot::default(),
                "b.jpg",
            )),
        )
        .await;

        let action = resolver
            .resolve_conflict(&tenant(), &row.id, ResolutionStrategy::PreferStorage, false)
            .await
            .unwrap();
        assert_eq!(action.storage_key, "b.jpg");

        let stored = catalogue.find_by_id(&tenant(), &row.id).await.unwrap().unwrap();
        assert_eq!(stored.storage_key, "b.jpg");
        assert_eq!(stored.photo_id, "b");
        assert_eq!(stored.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_photo_id_prefer_storage_with_deleted_incoming_keeps_conflict() {
        let (_, catalogue, resolver) = setup().await;
        let row = insert_row(
            &catalogue,
            "a.jpg",
            "a",
            Some(ConflictPayload::photo_id_conflict(
                MetadataSnapshot::default(),
                MetadataSnapshot::default(),
                "gone.jpg",
            )),
        )
        .await;

        let err = resolver
            .resolve_conflict(&tenant(), &row.id, ResolutionStrategy::PreferStorage, false)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound { ref id, .. } if id == "gone.jpg"));

        let stored = catalogue.find_by_id(&tenant(), &row.id).await.unwrap().unwrap();
        assert!(stored.is_conflicted());
    }

    #[tokio::test]
    async fn test_photo_id_prefer_database_clears_conflict_only() {
        let (_, catalogue, resolver) = setup().await;
        let row = insert_row(
            &catalogue,
            "a.jpg",
            "a",
            Some(ConflictPayload::photo_id_conflict(
                MetadataSnapshot::default(),
                MetadataSnapshot::default(),
                "b.jpg",
            )),
        )
        .await;

        resolver
            .resolve_conflict(&tenant(), &row.id, ResolutionStrategy::PreferDatabase, false)
            .await
            .unwrap();

        let stored = catalogue.find_by_id(&tenant(), &row.id).await.unwrap().unwrap();
        assert_eq!(stored.storage_key, "a.jpg");
        assert_eq!(stored.manifest, row.manifest);
        assert!(!stored.is_conflicted());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "prefer-storage".parse::<ResolutionStrategy>().unwrap(),
            ResolutionStrategy::PreferStorage
        );
        assert!("storage".parse::<ResolutionStrategy>().is_err());
    }
}
