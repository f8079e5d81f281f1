//! Core service façade and bootstrap helpers.
//!
//! This crate wires a validated [`CoreConfig`] into the reconciliation core:
//! it opens the catalogue database, selects the storage backend once, and
//! exposes sync, conflict resolution, upload and run history as one handle.
//! Backends are chosen at compile time with the `s3`, `github` and `local`
//! features.
//!
//! ```ignore
//! use core_service::PhotoSyncService;
//! use core_sync::{ProgressEmitter, SyncOptions};
//!
//! let service = PhotoSyncService::bootstrap(config).await?;
//! let (emitter, mut events) = ProgressEmitter::channel();
//! let result = service.run_sync(&tenant, SyncOptions::default(), &emitter).await?;
//! ```

pub mod backend;
pub mod error;

pub use backend::StorageBackend;
pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_desktop::ReqwestHttpClient;
use bridge_traits::http::HttpClient;
use bridge_traits::{Clock, StorageProvider, SystemClock};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::models::{SyncRunRecord, TenantId};
use core_library::repositories::{
    PhotoAssetRepository, SqlitePhotoAssetRepository, SqliteSyncRunRepository, SyncRunRepository,
};
use core_runtime::config::CoreConfig;
use core_runtime::logging::init_logging;
use core_sync::{
    ConflictResolver, DigestManifestBuilder, ManifestBuilder, ProgressEmitter, ResolutionStrategy,
    SyncAction, SyncCoordinator, SyncOptions, SyncRunResult, UploadCoordinator, UploadFile,
    UploadReport,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct PhotoSyncService {
    config: Arc<CoreConfig>,
    backend: Arc<StorageBackend>,
    catalogue: Arc<dyn PhotoAssetRepository>,
    runs: Arc<dyn SyncRunRepository>,
    manifest_builder: Arc<dyn ManifestBuilder>,
    clock: Arc<dyn Clock>,
}

impl PhotoSyncService {
    /// Install the configured logging subscriber, then build the service.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        init_logging(config.logging.clone())?;
        Self::new(config).await
    }

    /// Build the service with the default reqwest HTTP client.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
        Self::with_http_client(config, http).await
    }

    /// Build the service with a host-provided HTTP client.
    #[instrument(skip_all, fields(provider = config.storage.provider_tag()))]
    pub async fn with_http_client(config: CoreConfig, http: Arc<dyn HttpClient>) -> Result<Self> {
        config.validate()?;
        let backend = StorageBackend::from_config(&config.storage, http).await?;

        let pool = create_pool(
            DatabaseConfig::new(config.database.url.as_str())
                .max_connections(config.database.max_connections),
        )
        .await?;

        info!("Photo sync service initialized");
        Ok(Self {
            config: Arc::new(config),
            backend: Arc::new(backend),
            catalogue: Arc::new(SqlitePhotoAssetRepository::new(pool.clone())),
            runs: Arc::new(SqliteSyncRunRepository::new(pool)),
            manifest_builder: Arc::new(DigestManifestBuilder::new()),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the digest-only manifest builder with a full pipeline.
    pub fn with_manifest_builder(mut self, builder: Arc<dyn ManifestBuilder>) -> Self {
        self.manifest_builder = builder;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Tag stored on catalogue rows written by this service.
    pub fn provider_tag(&self) -> &'static str {
        self.config.storage.provider_tag()
    }

    fn provider(&self) -> Arc<dyn StorageProvider> {
        self.backend.clone()
    }

    /// Reconcile the tenant's catalogue against the storage backend.
    pub async fn run_sync(
        &self,
        tenant: &TenantId,
        options: SyncOptions,
        emitter: &ProgressEmitter,
    ) -> Result<SyncRunResult> {
        let coordinator = SyncCoordinator::new(
            self.provider(),
            self.provider_tag(),
            self.catalogue.clone(),
            self.runs.clone(),
        )
        .with_manifest_builder(self.manifest_builder.clone())
        .with_clock(self.clock.clone())
        .with_quota(self.config.quota);

        Ok(coordinator.run(tenant, options, emitter).await?)
    }

    /// Resolve one conflicted row with the given strategy.
    pub async fn resolve_conflict(
        &self,
        tenant: &TenantId,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        dry_run: bool,
    ) -> Result<SyncAction> {
        let resolver =
            ConflictResolver::new(self.provider(), self.provider_tag(), self.catalogue.clone())
                .with_manifest_builder(self.manifest_builder.clone())
                .with_clock(self.clock.clone());

        Ok(resolver
            .resolve_conflict(tenant, conflict_id, strategy, dry_run)
            .await?)
    }

    /// Upload and catalogue a batch of files under the configured root prefix.
    pub async fn upload_batch(
        &self,
        tenant: &TenantId,
        files: Vec<UploadFile>,
        cancel: &CancellationToken,
    ) -> Result<UploadReport> {
        let uploader =
            UploadCoordinator::new(self.provider(), self.provider_tag(), self.catalogue.clone())
                .with_root_prefix(self.config.storage.root_prefix())
                .with_manifest_builder(self.manifest_builder.clone())
                .with_clock(self.clock.clone())
                .with_quota(self.config.quota);

        Ok(uploader.upload_batch(tenant, files, cancel).await?)
    }

    /// Latest run audit rows, newest first.
    pub async fn recent_runs(&self, tenant: &TenantId, limit: u32) -> Result<Vec<SyncRunRecord>> {
        Ok(self.runs.list_recent(tenant, limit).await?)
    }

    pub fn public_url(&self, key: &str) -> Result<String> {
        Ok(self.backend.generate_public_url(key)?)
    }
}
