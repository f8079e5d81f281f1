//! # Sync Coordinator
//!
//! Reconciles one tenant's catalogue against its storage backend.
//!
//! ## Overview
//!
//! A run lists storage once, diffs the listing against the catalogue with
//! [`ReconciliationPlan`], then executes four stages in fixed order:
//!
//! 1. `missing-in-db`: import objects the catalogue does not know
//! 2. `orphan-in-db`: flag rows whose object is gone
//! 3. `metadata-conflicts`: resync rows whose bytes are unchanged, flag the rest
//! 4. `status-reconciliation`: mark healed rows as synced
//!
//! Items are processed one at a time so `action` events follow processing
//! order. Item failures become `error` actions and never stop a stage.
//! Unique-constraint races on insert become conflicts. There is no run-level
//! transaction; a rerun recomputes the diff from current state.
//!
//! Quota limits are checked after planning and before the first write. A
//! breach fails the whole run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{ProgressEmitter, SyncCoordinator, SyncOptions};
//!
//! let coordinator = SyncCoordinator::new(provider, "s3", catalogue, runs)
//!     .with_quota(config.quota.clone());
//! let (emitter, events) = ProgressEmitter::channel();
//! let result = coordinator
//!     .run(&tenant, SyncOptions { dry_run: true }, &emitter)
//!     .await?;
//! println!("{} would be inserted", result.summary.inserted);
//! ```

use crate::action::{ActionType, SyncAction};
use crate::error::{Result, SyncError};
use crate::manifest::{content_digest, DigestManifestBuilder, ManifestBuilder};
use crate::planner::{MatchedItem, ReconciliationPlan};
use crate::race::convert_insert_race;
use crate::progress::{
    LogContext, ProgressEmitter, ProgressLogLevel, RunOptions, StageStatus, SyncProgressEvent,
    SyncStage,
};
use crate::snapshot::snapshot_of;
use bridge_traits::storage::is_image_key;
use bridge_traits::{Clock, StorageObject, StorageProvider, SystemClock};
use core_library::models::{
    CatalogueRecord, ConflictPayload, ConflictType, Manifest, MetadataSnapshot, RunSummary,
    SyncRunRecord, TenantId,
};
use core_library::repositories::{PhotoAssetRepository, SyncRunRepository, WriteOutcome};
use core_runtime::config::QuotaConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Per-run options
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Report what would happen without writing
    pub dry_run: bool,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct SyncRunResult {
    /// Id of the audit row written for this run
    pub run_id: String,
    pub summary: RunSummary,
    pub actions: Vec<SyncAction>,
}

/// What processing one item produced
enum ItemOutcome {
    Action(SyncAction),
    /// Item left untouched; counted as skipped and logged
    Skipped { level: ProgressLogLevel, message: String },
}

/// Mutable state of one run
struct RunContext<'a> {
    tenant: &'a TenantId,
    dry_run: bool,
    emitter: &'a ProgressEmitter,
    summary: RunSummary,
    actions: Vec<SyncAction>,
}

/// Counters of the stage currently executing
struct StageCursor {
    stage: SyncStage,
    total: usize,
    processed: usize,
    index: usize,
}

impl<'a> RunContext<'a> {
    fn begin_stage(&self, stage: SyncStage, total: usize) -> StageCursor {
        info!(stage = %stage, total, "Stage started");
        self.emitter.emit(SyncProgressEvent::Stage {
            stage,
            status: StageStatus::Start,
            processed: 0,
            total,
            summary: self.summary,
        });
        StageCursor {
            stage,
            total,
            processed: 0,
            index: 0,
        }
    }

    fn finish_stage(&self, cursor: StageCursor) {
        info!(
            stage = %cursor.stage,
            processed = cursor.processed,
            actions = cursor.index,
            "Stage completed"
        );
        self.emitter.emit(SyncProgressEvent::Stage {
            stage: cursor.stage,
            status: StageStatus::Complete,
            processed: cursor.processed,
            total: cursor.total,
            summary: self.summary,
        });
    }

    fn record(&mut self, cursor: &mut StageCursor, storage_key: &str, outcome: ItemOutcome) {
        cursor.processed += 1;
        match outcome {
            ItemOutcome::Action(action) => {
                match action.action_type {
                    ActionType::Insert => self.summary.inserted += 1,
                    ActionType::Update => self.summary.updated += 1,
                    ActionType::Delete => self.summary.deleted += 1,
                    ActionType::Conflict => self.summary.conflicts += 1,
                    ActionType::Error => self.summary.errors += 1,
                }
                cursor.index += 1;
                self.emitter.emit(SyncProgressEvent::Action {
                    stage: cursor.stage,
                    index: cursor.index,
                    total: cursor.total,
                    action: action.clone(),
                    summary: self.summary,
                });
                self.actions.push(action);
            }
            ItemOutcome::Skipped { level, message } => {
                self.summary.skipped += 1;
                self.emitter.log(
                    level,
                    message,
                    LogContext::stage(cursor.stage).with_key(storage_key),
                );
            }
        }
    }
}

/// Four-stage reconciliation executor
pub struct SyncCoordinator {
    provider: Arc<dyn StorageProvider>,
    provider_tag: String,
    catalogue: Arc<dyn PhotoAssetRepository>,
    runs: Arc<dyn SyncRunRepository>,
    manifest_builder: Arc<dyn ManifestBuilder>,
    clock: Arc<dyn Clock>,
    quota: QuotaConfig,
}

impl SyncCoordinator {
    /// Coordinator with the digest manifest builder, the system clock and no
    /// quota limits.
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        provider_tag: impl Into<String>,
        catalogue: Arc<dyn PhotoAssetRepository>,
        runs: Arc<dyn SyncRunRepository>,
    ) -> Self {
        Self {
            provider,
            provider_tag: provider_tag.into(),
            catalogue,
            runs,
            manifest_builder: Arc::new(DigestManifestBuilder::new()),
            clock: Arc::new(SystemClock),
            quota: QuotaConfig::unlimited(),
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

    pub fn with_quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }

    /// Execute one reconciliation run.
    ///
    /// # Errors
    ///
    /// Returns an error, after emitting an `error` event, if:
    /// - Listing storage or loading the catalogue fails
    /// - A quota limit would be exceeded by the import stage
    /// - The audit row cannot be written
    ///
    /// Item-level failures are reported as `error` actions instead.
    #[instrument(skip(self, emitter), fields(tenant = %tenant, dry_run = options.dry_run))]
    pub async fn run(
        &self,
        tenant: &TenantId,
        options: SyncOptions,
        emitter: &ProgressEmitter,
    ) -> Result<SyncRunResult> {
        let started_at = self.clock.unix_timestamp_millis();

        // Phase 1: List storage and catalogue
        info!("Phase 1: Listing storage and catalogue");
        let (images, live_pairs, records) = match self.load_state(tenant).await {
            Ok(state) => state,
            Err(e) => {
                emitter.error(format!("Failed to load sync state: {}", e));
                return Err(e);
            }
        };

        // Phase 2: Plan
        info!("Phase 2: Planning reconciliation");
        let plan = ReconciliationPlan::build(&images, &records);
        let totals = plan.totals();
        info!(?totals, "Reconciliation plan ready");

        if let Err(e) = self.check_quota(&plan, records.len()) {
            emitter.error(e.to_string());
            return Err(e);
        }

        let mut ctx = RunContext {
            tenant,
            dry_run: options.dry_run,
            emitter,
            summary: RunSummary::default(),
            actions: Vec::new(),
        };

        emitter.emit(SyncProgressEvent::Start {
            summary: ctx.summary,
            totals,
            options: RunOptions {
                dry_run: options.dry_run,
            },
        });

        // Phase 3: Stages
        info!("Phase 3: Executing stages");
        self.import_stage(&mut ctx, &plan.missing_in_db, &live_pairs)
            .await;
        self.orphan_stage(&mut ctx, &plan.orphan_in_db).await;
        self.metadata_stage(&mut ctx, &plan.metadata_conflicts).await;
        self.status_stage(&mut ctx, &plan.status_reconciliation)
            .await;

        // Phase 4: Audit
        info!("Phase 4: Recording sync run");
        let run = SyncRunRecord::new(
            tenant.clone(),
            options.dry_run,
            ctx.summary,
            ctx.actions.len(),
            started_at,
            self.clock.unix_timestamp_millis(),
        );
        if let Err(e) = self.runs.insert(&run).await {
            let e = SyncError::from(e);
            emitter.error(format!("Failed to record sync run: {}", e));
            return Err(e);
        }

        emitter.log(
            ProgressLogLevel::Success,
            format!(
                "Sync finished: {} inserted, {} updated, {} conflicts, {} errors",
                ctx.summary.inserted, ctx.summary.updated, ctx.summary.conflicts, ctx.summary.errors
            ),
            LogContext::default(),
        );
        emitter.emit(SyncProgressEvent::Complete {
            summary: ctx.summary,
            actions: ctx.actions.clone(),
        });

        Ok(SyncRunResult {
            run_id: run.id,
            summary: ctx.summary,
            actions: ctx.actions,
        })
    }

    async fn load_state(
        &self,
        tenant: &TenantId,
    ) -> Result<(
        Vec<StorageObject>,
        HashMap<String, StorageObject>,
        Vec<CatalogueRecord>,
    )> {
        let on_progress = |discovered: usize| debug!(discovered, "Listing storage");
        let all_files = self.provider.list_all_files(Some(&on_progress)).await?;
        let live_pairs = self.provider.detect_live_photos(&all_files);
        let images: Vec<StorageObject> = all_files
            .into_iter()
            .filter(|o| is_image_key(&o.key))
            .collect();
        let records = self.catalogue.list_by_tenant(tenant).await?;

        info!(
            images = images.len(),
            live_photos = live_pairs.len(),
            records = records.len(),
            "Loaded sync state"
        );
        Ok((images, live_pairs, records))
    }

    fn check_quota(&self, plan: &ReconciliationPlan, existing: usize) -> Result<()> {
        let incoming = plan.missing_in_db.len() as u64;

        if let Some(limit) = self.quota.max_object_size_bytes {
            for object in &plan.missing_in_db {
                let size = object.size.unwrap_or(0).max(0) as u64;
                if size > limit {
                    return Err(SyncError::ObjectTooLarge {
                        key: object.key.clone(),
                        size,
                        limit,
                    });
                }
            }
        }

        if let Some(limit) = self.quota.max_imports_per_run {
            if incoming > limit {
                return Err(SyncError::QuotaExceeded {
                    quota: "imports per run".to_string(),
                    limit,
                    requested: incoming,
                });
            }
        }

        if let Some(limit) = self.quota.max_library_items {
            let requested = existing as u64 + incoming;
            if requested > limit {
                return Err(SyncError::QuotaExceeded {
                    quota: "library items".to_string(),
                    limit,
                    requested,
                });
            }
        }

        Ok(())
    }

    // =========================================================================
    // Stage 1: missing-in-db
    // =========================================================================

    async fn import_stage(
        &self,
        ctx: &mut RunContext<'_>,
        objects: &[StorageObject],
        live_pairs: &HashMap<String, StorageObject>,
    ) {
        let mut cursor = ctx.begin_stage(SyncStage::MissingInDb, objects.len());
        for object in objects {
            let video = live_pairs.get(&object.key);
            let outcome = match self.import_one(ctx.tenant, ctx.dry_run, object, video).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(key = %object.key, error = %e, "Import failed");
                    ItemOutcome::Action(SyncAction::error(&object.key, e.to_string()))
                }
            };
            ctx.record(&mut cursor, &object.key, outcome);
        }
        ctx.finish_stage(cursor);
    }

    async fn import_one(
        &self,
        tenant: &TenantId,
        dry_run: bool,
        object: &StorageObject,
        video: Option<&StorageObject>,
    ) -> Result<ItemOutcome> {
        let snapshot = snapshot_of(object);
        if dry_run {
            return Ok(ItemOutcome::Action(
                SyncAction::new(ActionType::Insert, &object.key, false)
                    .with_reason("would insert")
                    .with_after(snapshot),
            ));
        }

        let mut item = self
            .manifest_builder
            .build(self.provider.as_ref(), object, video)
            .await?;
        item.storage_key = object.key.clone();
        let now = self.clock.unix_timestamp_millis();
        let record = CatalogueRecord::new(
            tenant.clone(),
            &self.provider_tag,
            Manifest::new(item),
            &snapshot,
            now,
        );

        match self.catalogue.insert(&record).await? {
            WriteOutcome::Applied => {
                debug!(key = %object.key, photo_id = %record.photo_id, "Inserted catalogue row");
                Ok(ItemOutcome::Action(
                    SyncAction::new(ActionType::Insert, &object.key, true)
                        .with_photo_id(&record.photo_id)
                        .with_after(snapshot)
                        .with_manifest_after(record.manifest),
                ))
            }
            WriteOutcome::ConflictDetected(kind) => {
                let flagged =
                    convert_insert_race(self.catalogue.as_ref(), tenant, kind, &record, snapshot, now)
                        .await?;
                Ok(match flagged {
                    Some(action) => ItemOutcome::Action(action),
                    None => ItemOutcome::Skipped {
                        level: ProgressLogLevel::Warn,
                        message: format!(
                            "Unique constraint on {:?} fired but the owning row could not be loaded",
                            kind
                        ),
                    },
                })
            }
        }
    }

    // =========================================================================
    // Stage 2: orphan-in-db
    // =========================================================================

    async fn orphan_stage(&self, ctx: &mut RunContext<'_>, records: &[CatalogueRecord]) {
        let mut cursor = ctx.begin_stage(SyncStage::OrphanInDb, records.len());
        for record in records {
            let payload = ConflictPayload::missing_in_storage(record.snapshot());
            let outcome = match self.flag(ctx.tenant, ctx.dry_run, record, payload).await {
                Ok(outcome) => outcome,
                Err(e) => ItemOutcome::Action(SyncAction::error(&record.storage_key, e.to_string())),
            };
            ctx.record(&mut cursor, &record.storage_key, outcome);
        }
        ctx.finish_stage(cursor);
    }

    /// Put `record` into conflict with `payload` unless it already carries
    /// an equivalent one.
    async fn flag(
        &self,
        tenant: &TenantId,
        dry_run: bool,
        record: &CatalogueRecord,
        payload: ConflictPayload,
    ) -> Result<ItemOutcome> {
        if let Some(current) = record.conflict_payload.as_ref() {
            if record.is_conflicted() && current.is_equivalent(&payload) {
                return Ok(ItemOutcome::Skipped {
                    level: ProgressLogLevel::Info,
                    message: format!("Already flagged as {}", current.conflict_type),
                });
            }
        }
        if holds_photo_id_conflict(record) {
            return Ok(ItemOutcome::Skipped {
                level: ProgressLogLevel::Info,
                message: format!(
                    "Open {} kept; {} waits for its resolution",
                    ConflictType::PhotoIdConflict,
                    payload.conflict_type
                ),
            });
        }

        if !dry_run {
            self.catalogue
                .mark_conflict(tenant, &record.id, &payload, self.clock.unix_timestamp_millis())
                .await?;
        }

        let mut action = SyncAction::new(ActionType::Conflict, &record.storage_key, !dry_run)
            .with_photo_id(&record.photo_id)
            .with_reason(payload.conflict_type.default_reason())
            .with_before(record.snapshot())
            .with_manifest_before(record.manifest.clone());
        if let Some(storage) = payload.storage_snapshot.clone() {
            action = action.with_after(storage);
        }
        Ok(ItemOutcome::Action(action.with_conflict(&record.id, payload)))
    }

    // =========================================================================
    // Stage 3: metadata-conflicts
    // =========================================================================

    async fn metadata_stage(&self, ctx: &mut RunContext<'_>, items: &[MatchedItem]) {
        let mut cursor = ctx.begin_stage(SyncStage::MetadataConflicts, items.len());
        for item in items {
            let key = item.record.storage_key.as_str();
            let outcome = match self.resolve_drift(ctx, item).await {
                Ok(outcome) => outcome,
                Err(e) => ItemOutcome::Action(SyncAction::error(key, e.to_string())),
            };
            ctx.record(&mut cursor, key, outcome);
        }
        ctx.finish_stage(cursor);
    }

    async fn resolve_drift(&self, ctx: &RunContext<'_>, item: &MatchedItem) -> Result<ItemOutcome> {
        let record = &item.record;
        if self.content_unchanged(ctx, item).await {
            let reason = if holds_photo_id_conflict(record) {
                "content digest matched, photo-id conflict kept"
            } else {
                "content digest matched"
            };
            let action = SyncAction::new(ActionType::Update, &record.storage_key, !ctx.dry_run)
                .with_photo_id(&record.photo_id)
                .with_reason(reason)
                .with_before(record.snapshot())
                .with_after(item.storage_snapshot.clone());
            if !ctx.dry_run {
                self.refresh(record, &item.storage_snapshot).await?;
            }
            return Ok(ItemOutcome::Action(action));
        }

        let payload =
            ConflictPayload::metadata_mismatch(item.storage_snapshot.clone(), record.snapshot());
        self.flag(ctx.tenant, ctx.dry_run, record, payload).await
    }

    /// Download the object once and compare against the manifest digest.
    async fn content_unchanged(&self, ctx: &RunContext<'_>, item: &MatchedItem) -> bool {
        let key = item.record.storage_key.as_str();
        let Some(expected) = item.record.manifest.data.digest.as_deref() else {
            debug!(key, "No stored digest; cannot auto-resolve");
            return false;
        };

        match self.provider.get_file(key).await {
            Ok(Some(bytes)) => content_digest(&bytes) == expected,
            Ok(None) => false,
            Err(e) => {
                ctx.emitter.log(
                    ProgressLogLevel::Warn,
                    "Download for digest check failed",
                    LogContext::stage(SyncStage::MetadataConflicts)
                        .with_key(key)
                        .with_details(serde_json::json!({ "error": e.to_string() })),
                );
                false
            }
        }
    }

    /// Overwrite the stored snapshot and mark the row synced.
    ///
    /// A row holding an open photo-id conflict only gets the new snapshot;
    /// its status and payload stay for the operator.
    async fn refresh(
        &self,
        record: &CatalogueRecord,
        snapshot: &MetadataSnapshot,
    ) -> Result<()> {
        let now = self.clock.unix_timestamp_millis();
        let mut updated = record.clone();
        updated.apply_snapshot(snapshot);
        if holds_photo_id_conflict(record) {
            updated.updated_at = now;
        } else {
            updated.mark_synced(now);
        }

        match self.catalogue.update(&updated).await? {
            WriteOutcome::Applied => Ok(()),
            WriteOutcome::ConflictDetected(kind) => Err(SyncError::state_conflict(
                &record.id,
                format!("refresh collided with unique {:?}", kind),
            )),
        }
    }

    // =========================================================================
    // Stage 4: status-reconciliation
    // =========================================================================

    async fn status_stage(&self, ctx: &mut RunContext<'_>, items: &[MatchedItem]) {
        let mut cursor = ctx.begin_stage(SyncStage::StatusReconciliation, items.len());
        for item in items {
            let record = &item.record;
            let action = SyncAction::new(ActionType::Update, &record.storage_key, !ctx.dry_run)
                .with_photo_id(&record.photo_id)
                .with_reason(format!("status {} reconciled to synced", record.sync_status))
                .with_before(record.snapshot())
                .with_after(item.storage_snapshot.clone());

            let outcome = if ctx.dry_run {
                ItemOutcome::Action(action)
            } else {
                match self.refresh(record, &item.storage_snapshot).await {
                    Ok(()) => ItemOutcome::Action(action),
                    Err(e) => {
                        ItemOutcome::Action(SyncAction::error(&record.storage_key, e.to_string()))
                    }
                }
            };
            ctx.record(&mut cursor, &record.storage_key, outcome);
        }
        ctx.finish_stage(cursor);
    }
}

fn holds_photo_id_conflict(record: &CatalogueRecord) -> bool {
    record.is_conflicted() && record.conflict_type() == Some(ConflictType::PhotoIdConflict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryProvider;
    use bridge_traits::FixedClock;
    use core_library::db::create_test_pool;
    use core_library::repositories::{SqlitePhotoAssetRepository, SqliteSyncRunRepository};

    struct Harness {
        provider: Arc<MemoryProvider>,
        catalogue: Arc<SqlitePhotoAssetRepository>,
        runs: Arc<SqliteSyncRunRepository>,
        tenant: TenantId,
    }

    impl Harness {
        async fn new() -> Self {
            let pool = create_test_pool().await.unwrap();
            Self {
                provider: Arc::new(MemoryProvider::default()),
                catalogue: Arc::new(SqlitePhotoAssetRepository::new(pool.clone())),
                runs: Arc::new(SqliteSyncRunRepository::new(pool)),
                tenant: TenantId::new("t1"),
            }
        }

        fn coordinator(&self) -> SyncCoordinator {
            SyncCoordinator::new(
                self.provider.clone(),
                "s3",
                self.catalogue.clone(),
                self.runs.clone(),
            )
            .with_clock(Arc::new(FixedClock::at_millis(1_000)))
        }

        async fn rows(&self) -> Vec<CatalogueRecord> {
            self.catalogue.list_by_tenant(&self.tenant).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_import_inserts_and_pairs_live_photo() {
        let h = Harness::new().await;
        h.provider.put("IMG_01.jpg", b"still").await;
        h.provider.put("IMG_01.mov", b"video").await;

        let result = h
            .coordinator()
            .run(&h.tenant, SyncOptions::default(), &ProgressEmitter::silent())
            .await
            .unwrap();

        assert_eq!(result.summary.inserted, 1);
        let rows = h.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].photo_id, "IMG_01");
        assert_eq!(
            rows[0].manifest.data.live_photo.as_ref().map(|v| v.key.as_str()),
            Some("IMG_01.mov")
        );

        let history = h.runs.list_recent(&h.tenant, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, result.run_id);
        assert_eq!(history[0].actions_count, 1);
    }

    #[tokio::test]
    async fn test_quota_breach_fails_before_writes() {
        let h = Harness::new().await;
        h.provider.put("a.jpg", b"a").await;
        h.provider.put("b.jpg", b"b").await;
        let (emitter, mut events) = ProgressEmitter::channel();

        let err = h
            .coordinator()
            .with_quota(QuotaConfig::unlimited().with_max_imports_per_run(1))
            .run(&h.tenant, SyncOptions::default(), &emitter)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::QuotaExceeded { limit: 1, requested: 2, .. }
        ));
        assert!(h.rows().await.is_empty());
        assert!(h.runs.list_recent(&h.tenant, 10).await.unwrap().is_empty());
        assert!(matches!(
            events.recv().await,
            Some(SyncProgressEvent::Error { .. })
        ));
    }

    #[tokio::test]
    async fn test_library_quota_counts_existing_rows() {
        let h = Harness::new().await;
        h.provider.put("a.jpg", b"a").await;
        h.coordinator()
            .run(&h.tenant, SyncOptions::default(), &ProgressEmitter::silent())
            .await
            .unwrap();
        h.provider.put("b.jpg", b"b").await;

        let err = h
            .coordinator()
            .with_quota(QuotaConfig::unlimited().with_max_library_items(1))
            .run(&h.tenant, SyncOptions { dry_run: true }, &ProgressEmitter::silent())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::QuotaExceeded { limit: 1, requested: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_oversized_object_fails_run() {
        let h = Harness::new().await;
        h.provider.put("big.jpg", &[0u8; 64]).await;

        let err = h
            .coordinator()
            .with_quota(QuotaConfig::unlimited().with_max_object_size_bytes(16))
            .run(&h.tenant, SyncOptions::default(), &ProgressEmitter::silent())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::ObjectTooLarge { size: 64, limit: 16, .. }
        ));
    }

    #[tokio::test]
    async fn test_builder_failure_is_counted_and_stage_continues() {
        let h = Harness::new().await;
        h.provider.put("a.jpg", b"a").await;
        h.provider.put("b.jpg", b"b").await;
        h.provider.fail_get("a.jpg").await;

        let result = h
            .coordinator()
            .run(&h.tenant, SyncOptions::default(), &ProgressEmitter::silent())
            .await
            .unwrap();

        assert_eq!(result.summary.errors, 1);
        assert_eq!(result.summary.inserted, 1);
        assert_eq!(result.actions[0].action_type, ActionType::Error);
        assert!(!result.actions[0].applied);
        let rows = h.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].storage_key, "b.jpg");
    }

    #[tokio::test]
    async fn test_failed_digest_download_flags_with_error_details() {
        let h = Harness::new().await;
        h.provider.put("a.jpg", b"a").await;
        h.coordinator()
            .run(&h.tenant, SyncOptions::default(), &ProgressEmitter::silent())
            .await
            .unwrap();
        h.provider.put("a.jpg", b"rewritten").await;
        h.provider.fail_get("a.jpg").await;

        let (emitter, mut events) = ProgressEmitter::channel();
        let result = h
            .coordinator()
            .run(&h.tenant, SyncOptions::default(), &emitter)
            .await
            .unwrap();
        drop(emitter);

        assert_eq!(result.summary.conflicts, 1);
        let mut details = None;
        while let Some(event) = events.recv().await {
            if let SyncProgressEvent::Log {
                level: ProgressLogLevel::Warn,
                details: Some(d),
                ..
            } = event
            {
                details = Some(d);
            }
        }
        let details = details.unwrap();
        assert!(details["error"].as_str().unwrap().contains("get a.jpg failed"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let h = Harness::new().await;
        h.provider.fail_list().await;
        let (emitter, mut events) = ProgressEmitter::channel();

        let err = h
            .coordinator()
            .run(&h.tenant, SyncOptions::default(), &emitter)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Provider(_)));
        assert!(matches!(
            events.recv().await,
            Some(SyncProgressEvent::Error { .. })
        ));
    }

    #[tokio::test]
    async fn test_event_order_and_indices() {
        let h = Harness::new().await;
        h.provider.put("a.jpg", b"a").await;
        h.provider.put("b.jpg", b"b").await;
        let (emitter, mut events) = ProgressEmitter::channel();

        h.coordinator()
            .run(&h.tenant, SyncOptions::default(), &emitter)
            .await
            .unwrap();
        drop(emitter);

        let mut kinds = Vec::new();
        let mut indices = Vec::new();
        while let Some(event) = events.recv().await {
            match &event {
                SyncProgressEvent::Start { .. } => kinds.push("start"),
                SyncProgressEvent::Stage { status, .. } => kinds.push(match status {
                    StageStatus::Start => "stage-start",
                    StageStatus::Complete => "stage-complete",
                }),
                SyncProgressEvent::Action { index, total, .. } => {
                    assert_eq!(*total, 2);
                    indices.push(*index);
                    kinds.push("action");
                }
                SyncProgressEvent::Log { .. } => continue,
                SyncProgressEvent::Complete { .. } => kinds.push("complete"),
                SyncProgressEvent::Error { .. } => kinds.push("error"),
            }
        }

        assert_eq!(indices, vec![1, 2]);
        assert_eq!(kinds[0], "start");
        assert_eq!(
            &kinds[1..5],
            &["stage-start", "action", "action", "stage-complete"]
        );
        assert_eq!(kinds.iter().filter(|k| **k == "stage-start").count(), 4);
        assert_eq!(kinds.last(), Some(&"complete"));
    }
}
