//! Unique-constraint races on insert.
//!
//! Shared by the import stage and the upload pipeline: an insert rejected by
//! a tenant-scoped unique constraint flags the row that owns the value
//! instead of failing.

use crate::action::{ActionType, SyncAction};
use crate::error::Result;
use core_library::models::{CatalogueRecord, ConflictPayload, MetadataSnapshot, TenantId};
use core_library::repositories::{PhotoAssetRepository, UniqueConflict};
use tracing::{info, warn};

/// Flag the row that won the race against `candidate`.
///
/// # Returns
/// - `Some(action)` with the applied `conflict` action
/// - `None` if the owning row could not be loaded; the caller counts the
///   item as skipped
pub(crate) async fn convert_insert_race(
    catalogue: &dyn PhotoAssetRepository,
    tenant: &TenantId,
    kind: UniqueConflict,
    candidate: &CatalogueRecord,
    snapshot: MetadataSnapshot,
    now: i64,
) -> Result<Option<SyncAction>> {
    let key = candidate.storage_key.as_str();
    let existing = match kind {
        UniqueConflict::PhotoId => catalogue.find_by_photo_id(tenant, &candidate.photo_id).await?,
        UniqueConflict::StorageKey => catalogue.find_by_storage_key(tenant, key).await?,
    };
    let Some(existing) = existing else {
        warn!(key, ?kind, "Unique constraint fired but the owning row is gone");
        return Ok(None);
    };

    let payload = match kind {
        UniqueConflict::PhotoId => {
            ConflictPayload::photo_id_conflict(snapshot.clone(), existing.snapshot(), key)
        }
        UniqueConflict::StorageKey => {
            ConflictPayload::metadata_mismatch(snapshot.clone(), existing.snapshot())
        }
    };
    catalogue
        .mark_conflict(tenant, &existing.id, &payload, now)
        .await?;
    info!(
        key,
        conflict_id = %existing.id,
        conflict = %payload.conflict_type,
        "Insert race converted to conflict"
    );

    Ok(Some(
        SyncAction::new(ActionType::Conflict, key, true)
            .with_photo_id(&existing.photo_id)
            .with_reason(payload.conflict_type.default_reason())
            .with_before(existing.snapshot())
            .with_after(snapshot)
            .with_manifest_before(existing.manifest.clone())
            .with_manifest_after(candidate.manifest.clone())
            .with_conflict(&existing.id, payload),
    ))
}
