//! Shared fixtures for the core-sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::storage::ListProgress;
use bridge_traits::{BridgeError, FixedClock, StorageObject, StorageProvider, UploadOptions};
use bytes::Bytes;
use core_library::db::create_test_pool;
use core_library::models::{CatalogueRecord, ConflictPayload, ManifestItem, TenantId};
use core_library::repositories::{
    PhotoAssetRepository, SqlitePhotoAssetRepository, SqliteSyncRunRepository, UniqueConflict,
    WriteOutcome,
};
use core_sync::manifest::{DigestManifestBuilder, ManifestBuilder};
use core_sync::{
    ConflictResolver, ProgressEmitter, SyncCoordinator, SyncOptions, SyncRunResult,
    UploadCoordinator,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// ============================================================================
// Storage
// ============================================================================

#[derive(Default)]
struct StorageState {
    files: BTreeMap<String, (Bytes, StorageObject)>,
    writes: i64,
}

/// In-memory backend. Each write gets a fresh last-modified time and an etag
/// that changes with the content.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<StorageState>>,
}

impl MemoryStorage {
    pub async fn put(&self, key: &str, bytes: &[u8]) -> StorageObject {
        let mut state = self.state.lock().await;
        state.writes += 1;
        let etag = format!("{:x}", bytes.iter().fold(17u64, |h, b| h.wrapping_mul(31) ^ *b as u64));
        let object = StorageObject::new(key)
            .with_size(bytes.len() as i64)
            .with_etag(etag)
            .with_last_modified(
                chrono::DateTime::from_timestamp_millis(1_700_000_000_000 + state.writes * 60_000)
                    .unwrap_or_default(),
            );
        state
            .files
            .insert(key.to_string(), (Bytes::copy_from_slice(bytes), object.clone()));
        object
    }

    pub async fn remove(&self, key: &str) {
        self.state.lock().await.files.remove(key);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.files.contains_key(key)
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn list_all_files(
        &self,
        progress: Option<ListProgress<'_>>,
    ) -> BridgeResult<Vec<StorageObject>> {
        let objects: Vec<_> = self
            .state
            .lock()
            .await
            .files
            .values()
            .map(|(_, o)| o.clone())
            .collect();
        if let Some(progress) = progress {
            progress(objects.len());
        }
        Ok(objects)
    }

    async fn get_file(&self, key: &str) -> BridgeResult<Option<Bytes>> {
        Ok(self
            .state
            .lock()
            .await
            .files
            .get(key)
            .map(|(b, _)| b.clone()))
    }

    async fn upload_file(
        &self,
        key: &str,
        bytes: Bytes,
        _options: UploadOptions,
    ) -> BridgeResult<StorageObject> {
        Ok(self.put(key, &bytes).await)
    }

    async fn delete_file(&self, key: &str) -> BridgeResult<()> {
        self.remove(key).await;
        Ok(())
    }

    fn generate_public_url(&self, key: &str) -> BridgeResult<String> {
        if key.is_empty() {
            return Err(BridgeError::InvalidKey {
                key: key.to_string(),
                reason: "empty".to_string(),
            });
        }
        Ok(format!("memory://{}", key))
    }
}

// ============================================================================
// Manifest builder
// ============================================================================

/// Digest builder whose photo ids can be pinned per storage key, standing in
/// for a pipeline that derives ids from content.
#[derive(Default)]
pub struct PinnedIdBuilder {
    ids: Mutex<HashMap<String, String>>,
}

impl PinnedIdBuilder {
    pub async fn pin(&self, key: &str, photo_id: &str) {
        self.ids
            .lock()
            .await
            .insert(key.to_string(), photo_id.to_string());
    }
}

#[async_trait]
impl ManifestBuilder for PinnedIdBuilder {
    async fn build(
        &self,
        provider: &dyn StorageProvider,
        object: &StorageObject,
        live_video: Option<&StorageObject>,
    ) -> core_sync::Result<ManifestItem> {
        let mut item = DigestManifestBuilder::new()
            .build(provider, object, live_video)
            .await?;
        if let Some(id) = self.ids.lock().await.get(&object.key) {
            item.id = id.clone();
        }
        Ok(item)
    }
}

// ============================================================================
// Catalogue
// ============================================================================

/// Catalogue whose listing can be made to miss every row, as if another
/// writer inserted them after the listing was taken.
///
/// With `set_owner_lost`, inserts report a photo-id collision whose owning
/// row is already gone again, as if a concurrent writer deleted it.
pub struct StaleListingCatalogue {
    inner: SqlitePhotoAssetRepository,
    stale: AtomicBool,
    owner_lost: AtomicBool,
}

impl StaleListingCatalogue {
    pub fn set_stale(&self, stale: bool) {
        self.stale.store(stale, Ordering::SeqCst);
    }

    pub fn set_owner_lost(&self, lost: bool) {
        self.owner_lost.store(lost, Ordering::SeqCst);
    }
}

#[async_trait]
impl PhotoAssetRepository for StaleListingCatalogue {
    async fn list_by_tenant(
        &self,
        tenant: &TenantId,
    ) -> core_library::Result<Vec<CatalogueRecord>> {
        if self.stale.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner.list_by_tenant(tenant).await
    }

    async fn find_by_id(
        &self,
        tenant: &TenantId,
        id: &str,
    ) -> core_library::Result<Option<CatalogueRecord>> {
        self.inner.find_by_id(tenant, id).await
    }

    async fn find_by_photo_id(
        &self,
        tenant: &TenantId,
        photo_id: &str,
    ) -> core_library::Result<Option<CatalogueRecord>> {
        if self.owner_lost.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_by_photo_id(tenant, photo_id).await
    }

    async fn find_by_storage_key(
        &self,
        tenant: &TenantId,
        storage_key: &str,
    ) -> core_library::Result<Option<CatalogueRecord>> {
        self.inner.find_by_storage_key(tenant, storage_key).await
    }

    async fn insert(&self, record: &CatalogueRecord) -> core_library::Result<WriteOutcome> {
        if self.owner_lost.load(Ordering::SeqCst) {
            return Ok(WriteOutcome::ConflictDetected(UniqueConflict::PhotoId));
        }
        self.inner.insert(record).await
    }

    async fn update(&self, record: &CatalogueRecord) -> core_library::Result<WriteOutcome> {
        self.inner.update(record).await
    }

    async fn mark_conflict(
        &self,
        tenant: &TenantId,
        id: &str,
        payload: &ConflictPayload,
        updated_at: i64,
    ) -> core_library::Result<()> {
        self.inner.mark_conflict(tenant, id, payload, updated_at).await
    }

    async fn delete(&self, tenant: &TenantId, id: &str) -> core_library::Result<bool> {
        self.inner.delete(tenant, id).await
    }

    async fn count(&self, tenant: &TenantId) -> core_library::Result<i64> {
        self.inner.count(tenant).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub tenant: TenantId,
    pub storage: Arc<MemoryStorage>,
    pub builder: Arc<PinnedIdBuilder>,
    pub catalogue: Arc<StaleListingCatalogue>,
    pub runs: Arc<SqliteSyncRunRepository>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.expect("test pool");
        Self {
            tenant: TenantId::new("tenant-1"),
            storage: Arc::new(MemoryStorage::default()),
            builder: Arc::new(PinnedIdBuilder::default()),
            catalogue: Arc::new(StaleListingCatalogue {
                inner: SqlitePhotoAssetRepository::new(pool.clone()),
                stale: AtomicBool::new(false),
                owner_lost: AtomicBool::new(false),
            }),
            runs: Arc::new(SqliteSyncRunRepository::new(pool)),
            clock: Arc::new(FixedClock::at_millis(1_710_000_000_000)),
        }
    }

    pub fn coordinator(&self) -> SyncCoordinator {
        SyncCoordinator::new(
            self.storage.clone(),
            "s3",
            self.catalogue.clone(),
            self.runs.clone(),
        )
        .with_manifest_builder(self.builder.clone())
        .with_clock(self.clock.clone())
    }

    pub fn resolver(&self) -> ConflictResolver {
        ConflictResolver::new(self.storage.clone(), "s3", self.catalogue.clone())
            .with_manifest_builder(self.builder.clone())
            .with_clock(self.clock.clone())
    }

    pub fn uploader(&self) -> UploadCoordinator {
        UploadCoordinator::new(self.storage.clone(), "s3", self.catalogue.clone())
            .with_root_prefix(Some("library".to_string()))
            .with_manifest_builder(self.builder.clone())
            .with_clock(self.clock.clone())
    }

    pub async fn sync(&self) -> SyncRunResult {
        self.coordinator()
            .run(&self.tenant, SyncOptions::default(), &ProgressEmitter::silent())
            .await
            .expect("sync run")
    }

    pub async fn dry_run(&self) -> SyncRunResult {
        self.coordinator()
            .run(
                &self.tenant,
                SyncOptions { dry_run: true },
                &ProgressEmitter::silent(),
            )
            .await
            .expect("dry run")
    }

    pub async fn rows(&self) -> Vec<CatalogueRecord> {
        self.catalogue
            .list_by_tenant(&self.tenant)
            .await
            .expect("list rows")
    }

    pub async fn row_by_key(&self, key: &str) -> CatalogueRecord {
        self.catalogue
            .find_by_storage_key(&self.tenant, key)
            .await
            .expect("find row")
            .unwrap_or_else(|| panic!("no row for {}", key))
    }
}
