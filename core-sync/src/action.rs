//! Per-item action records reported by the stages and by manual resolution.

use core_library::models::{ConflictPayload, Manifest, MetadataSnapshot};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Insert,
    Update,
    Delete,
    Conflict,
    Error,
}

/// Before/after metadata of the touched object
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionSnapshots {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<MetadataSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<MetadataSnapshot>,
}

/// One processed item. `applied` is false for dry-run previews and for
/// items that failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub storage_key: String,
    pub photo_id: Option<String>,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_payload: Option<ConflictPayload>,
    pub snapshots: ActionSnapshots,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_before: Option<Manifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_after: Option<Manifest>,
}

impl SyncAction {
    pub fn new(action_type: ActionType, storage_key: impl Into<String>, applied: bool) -> Self {
        Self {
            action_type,
            storage_key: storage_key.into(),
            photo_id: None,
            applied,
            reason: None,
            conflict_id: None,
            conflict_payload: None,
            snapshots: ActionSnapshots::default(),
            manifest_before: None,
            manifest_after: None,
        }
    }

    /// A failed item; never applied.
    pub fn error(storage_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ActionType::Error, storage_key, false).with_reason(reason)
    }

    pub fn with_photo_id(mut self, photo_id: impl Into<String>) -> Self {
        self.photo_id = Some(photo_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach the conflicted row id and its payload.
    pub fn with_conflict(mut self, conflict_id: impl Into<String>, payload: ConflictPayload) -> Self {
        self.conflict_id = Some(conflict_id.into());
        self.conflict_payload = Some(payload);
        self
    }

    pub fn with_before(mut self, snapshot: MetadataSnapshot) -> Self {
        self.snapshots.before = Some(snapshot);
        self
    }

    pub fn with_after(mut self, snapshot: MetadataSnapshot) -> Self {
        self.snapshots.after = Some(snapshot);
        self
    }

    pub fn with_manifest_before(mut self, manifest: Manifest) -> Self {
        self.manifest_before = Some(manifest);
        self
    }

    pub fn with_manifest_after(mut self, manifest: Manifest) -> Self {
        self.manifest_after = Some(manifest);
        self
    }
}
