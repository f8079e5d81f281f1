//! # Upload Pipeline
//!
//! Uploads a batch of files and catalogues them.
//!
//! ## Workflow
//!
//! 1. Reject an empty batch and plan keys with [`UploadKeyAllocator`]
//! 2. Check the library quota before any I/O
//! 3. Per unit (a still with its video, or a video for a catalogued still):
//!    check the abort signal, enforce the object size limit, upload, build
//!    the manifest and write the row
//!
//! Aborting fails the call with [`SyncError::Aborted`]. Units finished before
//! the abort stay written. An oversized or failing unit is reported as an
//! `error` action and the batch continues.

use crate::action::{ActionType, SyncAction};
use crate::error::{Result, SyncError};
use crate::manifest::{attach_live_video, DigestManifestBuilder, ManifestBuilder};
use crate::race::convert_insert_race;
use crate::snapshot::snapshot_of;
use crate::upload::{PlannedAttachment, PlannedStill, UploadFile, UploadKeyAllocator};
use bridge_traits::{Clock, StorageObject, StorageProvider, SystemClock, UploadOptions};
use core_library::models::{CatalogueRecord, Manifest, RunSummary, TenantId};
use core_library::repositories::{PhotoAssetRepository, WriteOutcome};
use core_runtime::config::QuotaConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Result of one batch
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub summary: RunSummary,
    pub actions: Vec<SyncAction>,
}

impl UploadReport {
    fn push(&mut self, action: SyncAction) {
        match action.action_type {
            ActionType::Insert => self.summary.inserted += 1,
            ActionType::Update => self.summary.updated += 1,
            ActionType::Delete => self.summary.deleted += 1,
            ActionType::Conflict => self.summary.conflicts += 1,
            ActionType::Error => self.summary.errors += 1,
        }
        self.actions.push(action);
    }
}

pub struct UploadCoordinator {
    provider: Arc<dyn StorageProvider>,
    provider_tag: String,
    root_prefix: Option<String>,
    catalogue: Arc<dyn PhotoAssetRepository>,
    manifest_builder: Arc<dyn ManifestBuilder>,
    clock: Arc<dyn Clock>,
    quota: QuotaConfig,
}

impl UploadCoordinator {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        provider_tag: impl Into<String>,
        catalogue: Arc<dyn PhotoAssetRepository>,
    ) -> Self {
        Self {
            provider,
            provider_tag: provider_tag.into(),
            root_prefix: None,
            catalogue,
            manifest_builder: Arc::new(DigestManifestBuilder::new()),
            clock: Arc::new(SystemClock),
            quota: QuotaConfig::unlimited(),
        }
    }

    pub fn with_root_prefix(mut self, prefix: Option<String>) -> Self {
        self.root_prefix = prefix;
        self
    }

    pub fn with_manifest_builder(mut self, builder: Arc<dyn ManifestBuilder>) -> Self {
        self.manifest_builder = builder;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }

    /// Upload `files` for `tenant`.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty batch or an unpaired video
    /// - `QuotaExceeded` if the batch would overflow the library limit
    /// - `Aborted` once `cancel` is observed
    #[instrument(skip(self, files, cancel), fields(tenant = %tenant, files = files.len()))]
    pub async fn upload_batch(
        &self,
        tenant: &TenantId,
        files: Vec<UploadFile>,
        cancel: &CancellationToken,
    ) -> Result<UploadReport> {
        info!("Phase 1: Allocating storage keys");
        let existing = self.catalogue.list_by_tenant(tenant).await?;
        let plan = UploadKeyAllocator::allocate(&files, self.root_prefix.as_deref(), &existing)?;

        if let Some(limit) = self.quota.max_library_items {
            let requested = (existing.len() + plan.stills.len()) as u64;
            if requested > limit {
                return Err(SyncError::QuotaExceeded {
                    quota: "library items".to_string(),
                    limit,
                    requested,
                });
            }
        }

        info!(
            stills = plan.stills.len(),
            attachments = plan.attachments.len(),
            "Phase 2: Uploading"
        );
        let mut report = UploadReport::default();
        for still in &plan.stills {
            if cancel.is_cancelled() {
                warn!(completed = report.actions.len(), "Upload aborted");
                return Err(SyncError::Aborted);
            }
            let action = match self.upload_still(tenant, &files, still).await {
                Ok(action) => action,
                Err(e) => SyncAction::error(&still.storage_key, e.to_string()),
            };
            report.push(action);
        }

        for attachment in &plan.attachments {
            if cancel.is_cancelled() {
                warn!(completed = report.actions.len(), "Upload aborted");
                return Err(SyncError::Aborted);
            }
            let action = match self.upload_attachment(tenant, &files, attachment).await {
                Ok(action) => action,
                Err(e) => SyncAction::error(&attachment.video.storage_key, e.to_string()),
            };
            report.push(action);
        }

        info!(
            inserted = report.summary.inserted,
            conflicts = report.summary.conflicts,
            errors = report.summary.errors,
            "Upload batch completed"
        );
        Ok(report)
    }

    fn check_size(&self, key: &str, file: &UploadFile) -> Result<()> {
        if let Some(limit) = self.quota.max_object_size_bytes {
            let size = file.bytes.len() as u64;
            if size > limit {
                return Err(SyncError::ObjectTooLarge {
                    key: key.to_string(),
                    size,
                    limit,
                });
            }
        }
        Ok(())
    }

    async fn put(&self, key: &str, file: &UploadFile) -> Result<StorageObject> {
        let options = UploadOptions::content_type(file.resolved_content_type());
        Ok(self
            .provider
            .upload_file(key, file.bytes.clone(), options)
            .await?)
    }

    async fn upload_still(
        &self,
        tenant: &TenantId,
        files: &[UploadFile],
        still: &PlannedStill,
    ) -> Result<SyncAction> {
        let still_file = &files[still.file_index];
        self.check_size(&still.storage_key, still_file)?;
        if let Some(video) = &still.video {
            self.check_size(&video.storage_key, &files[video.file_index])?;
        }

        let stored = self.put(&still.storage_key, still_file).await?;
        let stored_video = match &still.video {
            Some(video) => Some(self.put(&video.storage_key, &files[video.file_index]).await?),
            None => None,
        };

        let mut item = self
            .manifest_builder
            .build(self.provider.as_ref(), &stored, stored_video.as_ref())
            .await
            .map_err(|e| SyncError::ManifestBuild {
                key: still.storage_key.clone(),
                message: e.to_string(),
            })?;
        item.id = still.photo_id.clone();
        item.storage_key = still.storage_key.clone();

        let snapshot = snapshot_of(&stored);
        let now = self.clock.unix_timestamp_millis();
        let record = CatalogueRecord::new(
            tenant.clone(),
            &self.provider_tag,
            Manifest::new(item),
            &snapshot,
            now,
        );

        match self.catalogue.insert(&record).await? {
            WriteOutcome::Applied => Ok(SyncAction::new(ActionType::Insert, &record.storage_key, true)
                .with_photo_id(&record.photo_id)
                .with_after(snapshot)
                .with_manifest_after(record.manifest)),
            WriteOutcome::ConflictDetected(kind) => {
                convert_insert_race(self.catalogue.as_ref(), tenant, kind, &record, snapshot, now)
                    .await?
                    .ok_or_else(|| {
                        SyncError::state_conflict(
                            &record.storage_key,
                            format!("unique {:?} collision with a row that vanished", kind),
                        )
                    })
            }
        }
    }

    async fn upload_attachment(
        &self,
        tenant: &TenantId,
        files: &[UploadFile],
        attachment: &PlannedAttachment,
    ) -> Result<SyncAction> {
        let video_file = &files[attachment.video.file_index];
        self.check_size(&attachment.video.storage_key, video_file)?;

        let record = self
            .catalogue
            .find_by_id(tenant, &attachment.record_id)
            .await?
            .ok_or_else(|| SyncError::not_found("photo asset", &attachment.record_id))?;
        let stored = self.put(&attachment.video.storage_key, video_file).await?;

        let mut updated = record.clone();
        attach_live_video(&mut updated.manifest.data, &stored);
        updated.updated_at = self.clock.unix_timestamp_millis();
        match self.catalogue.update(&updated).await? {
            WriteOutcome::Applied => Ok(SyncAction::new(ActionType::Update, &attachment.still_key, true)
                .with_photo_id(&record.photo_id)
                .with_reason(format!("live photo video {} attached", stored.key))
                .with_manifest_before(record.manifest)
                .with_manifest_after(updated.manifest)),
            WriteOutcome::ConflictDetected(kind) => Err(SyncError::state_conflict(
                &record.id,
                format!("attaching video collided on {:?}", kind),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryProvider;
    use bridge_traits::FixedClock;
    use core_library::db::create_test_pool;
    use core_library::repositories::SqlitePhotoAssetRepository;

    async fn setup() -> (Arc<MemoryProvider>, Arc<SqlitePhotoAssetRepository>, UploadCoordinator) {
        let provider = Arc::new(MemoryProvider::default());
        let catalogue = Arc::new(SqlitePhotoAssetRepository::new(create_test_pool().await.unwrap()));
        let uploader = UploadCoordinator::new(provider.clone(), "s3", catalogue.clone())
            .with_root_prefix(Some("photos".to_string()))
            .with_clock(Arc::new(FixedClock::at_millis(1_000)));
        (provider, catalogue, uploader)
    }

    fn tenant() -> TenantId {
        TenantId::new("t1")
    }

    #[tokio::test]
    async fn test_uploads_live_photo_pair() {
        let (provider, catalogue, uploader) = setup().await;
        let files = vec![
            UploadFile::new("IMG_01.jpg", &b"still"[..]),
            UploadFile::new("IMG_01.mov", &b"video"[..]),
        ];

        let report = uploader
            .upload_batch(&tenant(), files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.summary.inserted, 1);
        assert!(provider.contains("photos/IMG_01.jpg").await);
        assert!(provider.contains("photos/IMG_01.mov").await);
        let row = catalogue
            .find_by_storage_key(&tenant(), "photos/IMG_01.jpg")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.photo_id, "IMG_01");
        assert_eq!(
            row.manifest.data.live_photo.map(|v| v.key),
            Some("photos/IMG_01.mov".to_string())
        );
    }

    #[tokio::test]
    async fn test_cancelled_batch_issues_no_uploads() {
        let (provider, catalogue, uploader) = setup().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = uploader
            .upload_batch(&tenant(), vec![UploadFile::new("a.jpg", &b"a"[..])], &cancel)
            .await
            .unwrap_err();

        assert!(err.is_abort());
        assert!(!provider.contains("photos/a.jpg").await);
        assert_eq!(catalogue.count(&tenant()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected_alone() {
        let (provider, _, uploader) = setup().await;
        let uploader = uploader.with_quota(QuotaConfig::unlimited().with_max_object_size_bytes(4));
        let files = vec![
            UploadFile::new("big.jpg", vec![0u8; 10]),
            UploadFile::new("small.jpg", &b"ok"[..]),
        ];

        let report = uploader
            .upload_batch(&tenant(), files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.summary.inserted, 1);
        assert!(!provider.contains("photos/big.jpg").await);
        assert!(provider.contains("photos/small.jpg").await);
    }

    #[tokio::test]
    async fn test_library_quota_checked_before_io() {
        let (provider, _, uploader) = setup().await;
        let uploader = uploader.with_quota(QuotaConfig::unlimited().with_max_library_items(1));
        let files = vec![
            UploadFile::new("a.jpg", &b"a"[..]),
            UploadFile::new("b.jpg", &b"b"[..]),
        ];

        let err = uploader
            .upload_batch(&tenant(), files, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::QuotaExceeded { .. }));
        assert!(!provider.contains("photos/a.jpg").await);
    }

    #[tokio::test]
    async fn test_video_attaches_to_existing_still() {
        let (_, catalogue, uploader) = setup().await;
        uploader
            .upload_batch(
                &tenant(),
                vec![UploadFile::new("IMG_05.jpg", &b"still"[..])],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let report = uploader
            .upload_batch(
                &tenant(),
                vec![UploadFile::new("IMG_05.MOV", &b"video"[..])],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.summary.updated, 1);
        assert_eq!(catalogue.count(&tenant()).await.unwrap(), 1);
        let row = catalogue
            .find_by_storage_key(&tenant(), "photos/IMG_05.jpg")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            row.manifest.data.live_photo.map(|v| v.key),
            Some("photos/IMG_05.MOV".to_string())
        );
    }
}
