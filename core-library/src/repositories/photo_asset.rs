//! Photo asset repository trait and implementation
//!
//! Writes report unique-constraint races as a [`WriteOutcome`] instead of an
//! error, so the reconciliation state machine can branch on them directly.

use crate::error::{LibraryError, Result};
use crate::models::{CatalogueRecord, ConflictPayload, Manifest, SyncStatus, TenantId};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// Which tenant-scoped unique constraint a write collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConflict {
    /// `(tenant_id, photo_id)`
    PhotoId,
    /// `(tenant_id, storage_key)`
    StorageKey,
}

/// Result of an insert or update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    ConflictDetected(UniqueConflict),
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// Catalogue access for one tenant at a time
#[async_trait]
pub trait PhotoAssetRepository: Send + Sync {
    /// All rows for a tenant, ordered by storage key.
    async fn list_by_tenant(&self, tenant: &TenantId) -> Result<Vec<CatalogueRecord>>;

    async fn find_by_id(&self, tenant: &TenantId, id: &str) -> Result<Option<CatalogueRecord>>;

    async fn find_by_photo_id(
        &self,
        tenant: &TenantId,
        photo_id: &str,
    ) -> Result<Option<CatalogueRecord>>;

    async fn find_by_storage_key(
        &self,
        tenant: &TenantId,
        storage_key: &str,
    ) -> Result<Option<CatalogueRecord>>;

    /// Insert a new row.
    ///
    /// # Returns
    /// - `WriteOutcome::Applied` when the row was created
    /// - `WriteOutcome::ConflictDetected(kind)` when a unique constraint fired
    async fn insert(&self, record: &CatalogueRecord) -> Result<WriteOutcome>;

    /// Overwrite every mutable column of an existing row.
    ///
    /// # Errors
    /// Returns `NotFound` if the row does not exist.
    async fn update(&self, record: &CatalogueRecord) -> Result<WriteOutcome>;

    /// Set `conflict` status with the given payload.
    async fn mark_conflict(
        &self,
        tenant: &TenantId,
        id: &str,
        payload: &ConflictPayload,
        updated_at: i64,
    ) -> Result<()>;

    /// Delete a row.
    ///
    /// # Returns
    /// - `Ok(true)` if the row was deleted
    /// - `Ok(false)` if the row was not found
    async fn delete(&self, tenant: &TenantId, id: &str) -> Result<bool>;

    async fn count(&self, tenant: &TenantId) -> Result<i64>;
}

#[derive(Debug, FromRow)]
struct PhotoAssetRow {
    id: String,
    tenant_id: String,
    photo_id: String,
    storage_key: String,
    storage_provider: String,
    manifest_version: String,
    manifest: String,
    size: Option<i64>,
    etag: Option<String>,
    last_modified: Option<String>,
    metadata_hash: Option<String>,
    sync_status: String,
    conflict_reason: Option<String>,
    conflict_payload: Option<String>,
    synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<PhotoAssetRow> for CatalogueRecord {
    type Error = LibraryError;

    fn try_from(row: PhotoAssetRow) -> Result<Self> {
        let corrupt = |field: &str, message: String| LibraryError::Serialization {
            id: row.id.clone(),
            field: field.to_string(),
            message,
        };

        let data = serde_json::from_str(&row.manifest)
            .map_err(|e| corrupt("manifest", e.to_string()))?;
        let sync_status: SyncStatus = row
            .sync_status
            .parse()
            .map_err(|e: String| corrupt("sync_status", e))?;
        let conflict_payload = row
            .conflict_payload
            .as_deref()
            .map(serde_json::from_str::<ConflictPayload>)
            .transpose()
            .map_err(|e| corrupt("conflict_payload", e.to_string()))?;

        Ok(CatalogueRecord {
            id: row.id,
            tenant_id: TenantId::new(row.tenant_id),
            photo_id: row.photo_id,
            storage_key: row.storage_key,
            storage_provider: row.storage_provider,
            manifest: Manifest {
                version: row.manifest_version,
                data,
            },
            size: row.size,
            etag: row.etag,
            last_modified: row.last_modified,
            metadata_hash: row.metadata_hash,
            sync_status,
            conflict_reason: row.conflict_reason,
            conflict_payload,
            synced_at: row.synced_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Map a driver error to the unique constraint it reports, if any.
///
/// SQLite names the constrained columns in the message
/// (`UNIQUE constraint failed: photo_assets.tenant_id, photo_assets.photo_id`).
fn classify_unique_violation(error: &sqlx::Error) -> Option<UniqueConflict> {
    let sqlx::Error::Database(db_error) = error else {
        return None;
    };
    if !db_error.is_unique_violation() {
        return None;
    }
    let message = db_error.message();
    if message.contains("photo_assets.photo_id") {
        Some(UniqueConflict::PhotoId)
    } else if message.contains("photo_assets.storage_key") {
        Some(UniqueConflict::StorageKey)
    } else {
        None
    }
}

fn to_json<T: serde::Serialize>(id: &str, field: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| LibraryError::Serialization {
        id: id.to_string(),
        field: field.to_string(),
        message: e.to_string(),
    })
}

fn validate(record: &CatalogueRecord) -> Result<()> {
    record.validate().map_err(|message| LibraryError::InvalidInput {
        field: "photo_asset".to_string(),
        message,
    })
}

/// SQLite implementation of PhotoAssetRepository
pub struct SqlitePhotoAssetRepository {
    pool: SqlitePool,
}

impl SqlitePhotoAssetRepository {
    /// Create a new SQLite photo asset repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        column: &str,
        tenant: &TenantId,
        value: &str,
    ) -> Result<Option<CatalogueRecord>> {
        let sql = format!(
            "SELECT * FROM photo_assets WHERE tenant_id = ? AND {} = ?",
            column
        );
        let row = sqlx::query_as::<_, PhotoAssetRow>(&sql)
            .bind(tenant.as_str())
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CatalogueRecord::try_from).transpose()
    }
}

#[async_trait]
impl PhotoAssetRepository for SqlitePhotoAssetRepository {
    async fn list_by_tenant(&self, tenant: &TenantId) -> Result<Vec<CatalogueRecord>> {
        let rows = sqlx::query_as::<_, PhotoAssetRow>(
            "SELECT * FROM photo_assets WHERE tenant_id = ? ORDER BY storage_key",
        )
        .bind(tenant.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CatalogueRecord::try_from).collect()
    }

    async fn find_by_id(&self, tenant: &TenantId, id: &str) -> Result<Option<CatalogueRecord>> {
        self.fetch_one_where("id", tenant, id).await
    }

    async fn find_by_photo_id(
        &self,
        tenant: &TenantId,
        photo_id: &str,
    ) -> Result<Option<CatalogueRecord>> {
        self.fetch_one_where("photo_id", tenant, photo_id).await
    }

    async fn find_by_storage_key(
        &self,
        tenant: &TenantId,
        storage_key: &str,
    ) -> Result<Option<CatalogueRecord>> {
        self.fetch_one_where("storage_key", tenant, storage_key)
            .await
    }

    async fn insert(&self, record: &CatalogueRecord) -> Result<WriteOutcome> {
        validate(record)?;
        let manifest = to_json(&record.id, "manifest", &record.manifest.data)?;
        let payload = record
            .conflict_payload
            .as_ref()
            .map(|p| to_json(&record.id, "conflict_payload", p))
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO photo_assets (
                id, tenant_id, photo_id, storage_key, storage_provider,
                manifest_version, manifest, size, etag, last_modified, metadata_hash,
                sync_status, conflict_reason, conflict_payload,
                synced_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.tenant_id.as_str())
        .bind(&record.photo_id)
        .bind(&record.storage_key)
        .bind(&record.storage_provider)
        .bind(&record.manifest.version)
        .bind(manifest)
        .bind(record.size)
        .bind(&record.etag)
        .bind(&record.last_modified)
        .bind(&record.metadata_hash)
        .bind(record.sync_status.as_str())
        .bind(&record.conflict_reason)
        .bind(payload)
        .bind(record.synced_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(WriteOutcome::Applied),
            Err(error) => match classify_unique_violation(&error) {
                Some(kind) => {
                    debug!(
                        storage_key = %record.storage_key,
                        photo_id = %record.photo_id,
                        ?kind,
                        "Insert hit unique constraint"
                    );
                    Ok(WriteOutcome::ConflictDetected(kind))
                }
                None => Err(error.into()),
            },
        }
    }

    async fn update(&self, record: &CatalogueRecord) -> Result<WriteOutcome> {
        validate(record)?;
        let manifest = to_json(&record.id, "manifest", &record.manifest.data)?;
        let payload = record
            .conflict_payload
            .as_ref()
            .map(|p| to_json(&record.id, "conflict_payload", p))
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE photo_assets SET
                photo_id = ?, storage_key = ?, storage_provider = ?,
                manifest_version = ?, manifest = ?,
                size = ?, etag = ?, last_modified = ?, metadata_hash = ?,
                sync_status = ?, conflict_reason = ?, conflict_payload = ?,
                synced_at = ?, updated_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(&record.photo_id)
        .bind(&record.storage_key)
        .bind(&record.storage_provider)
        .bind(&record.manifest.version)
        .bind(manifest)
        .bind(record.size)
        .bind(&record.etag)
        .bind(&record.last_modified)
        .bind(&record.metadata_hash)
        .bind(record.sync_status.as_str())
        .bind(&record.conflict_reason)
        .bind(payload)
        .bind(record.synced_at)
        .bind(record.updated_at)
        .bind(record.tenant_id.as_str())
        .bind(&record.id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(LibraryError::NotFound {
                entity_type: "PhotoAsset".to_string(),
                id: record.id.clone(),
            }),
            Ok(_) => Ok(WriteOutcome::Applied),
            Err(error) => match classify_unique_violation(&error) {
                Some(kind) => Ok(WriteOutcome::ConflictDetected(kind)),
                None => Err(error.into()),
            },
        }
    }

    async fn mark_conflict(
        &self,
        tenant: &TenantId,
        id: &str,
        payload: &ConflictPayload,
        updated_at: i64,
    ) -> Result<()> {
        let json = to_json(id, "conflict_payload", payload)?;

        let result = sqlx::query(
            r#"
            UPDATE photo_assets SET
                sync_status = 'conflict', conflict_reason = ?, conflict_payload = ?, updated_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(payload.conflict_type.default_reason())
        .bind(json)
        .bind(updated_at)
        .bind(tenant.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "PhotoAsset".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn delete(&self, tenant: &TenantId, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM photo_assets WHERE tenant_id = ? AND id = ?")
            .bind(tenant.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, tenant: &TenantId) -> Result<i64> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM photo_assets WHERE tenant_id = ?")
            .bind(tenant.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(total.0)
    }
}
