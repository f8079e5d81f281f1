//! Sync run audit repository
//!
//! Rows are append-only; the schema rejects updates with a trigger.

use crate::error::{LibraryError, Result};
use crate::models::{RunSummary, SyncRunRecord, TenantId};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    async fn insert(&self, run: &SyncRunRecord) -> Result<()>;

    /// Most recent runs first.
    async fn list_recent(&self, tenant: &TenantId, limit: u32) -> Result<Vec<SyncRunRecord>>;
}

#[derive(Debug, FromRow)]
struct SyncRunRow {
    id: String,
    tenant_id: String,
    dry_run: bool,
    summary: String,
    actions_count: i64,
    started_at: i64,
    completed_at: i64,
}

impl TryFrom<SyncRunRow> for SyncRunRecord {
    type Error = LibraryError;

    fn try_from(row: SyncRunRow) -> Result<Self> {
        let summary: RunSummary =
            serde_json::from_str(&row.summary).map_err(|e| LibraryError::Serialization {
                id: row.id.clone(),
                field: "summary".to_string(),
                message: e.to_string(),
            })?;

        Ok(SyncRunRecord {
            id: row.id,
            tenant_id: TenantId::new(row.tenant_id),
            dry_run: row.dry_run,
            summary,
            actions_count: row.actions_count,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// SQLite implementation of SyncRunRepository
pub struct SqliteSyncRunRepository {
    pool: SqlitePool,
}

impl SqliteSyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncRunRepository for SqliteSyncRunRepository {
    async fn insert(&self, run: &SyncRunRecord) -> Result<()> {
        if run.completed_at < run.started_at {
            return Err(LibraryError::InvalidInput {
                field: "completed_at".to_string(),
                message: "run cannot complete before it starts".to_string(),
            });
        }
        let summary = serde_json::to_string(&run.summary).map_err(|e| {
            LibraryError::Serialization {
                id: run.id.clone(),
                field: "summary".to_string(),
                message: e.to_string(),
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, tenant_id, dry_run, summary, actions_count, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(run.tenant_id.as_str())
        .bind(run.dry_run)
        .bind(summary)
        .bind(run.actions_count)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(&self, tenant: &TenantId, limit: u32) -> Result<Vec<SyncRunRecord>> {
        let rows = sqlx::query_as::<_, SyncRunRow>(
            r#"
            SELECT * FROM sync_runs
            WHERE tenant_id = ?
            ORDER BY completed_at DESC, started_at DESC
            LIMIT ?
            "#,
        )
        .bind(tenant.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncRunRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn run(tenant: &str, completed_at: i64) -> SyncRunRecord {
        SyncRunRecord::new(
            TenantId::new(tenant),
            false,
            RunSummary {
                inserted: 2,
                conflicts: 1,
                ..Default::default()
            },
            3,
            completed_at - 10,
            completed_at,
        )
    }

    #[tokio::test]
    async fn test_insert_and_list_recent() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSyncRunRepository::new(pool);
        let tenant = TenantId::new("t1");

        repo.insert(&run("t1", 100)).await.unwrap();
        repo.insert(&run("t1", 300)).await.unwrap();
        repo.insert(&run("t1", 200)).await.unwrap();
        repo.insert(&run("t2", 400)).await.unwrap();

        let runs = repo.list_recent(&tenant, 2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].completed_at, 300);
        assert_eq!(runs[1].completed_at, 200);
        assert_eq!(runs[0].summary.inserted, 2);
        assert_eq!(runs[0].actions_count, 3);
    }

    #[tokio::test]
    async fn test_runs_are_append_only() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSyncRunRepository::new(pool.clone());
        let record = run("t1", 100);
        repo.insert(&record).await.unwrap();

        let result = sqlx::query("UPDATE sync_runs SET actions_count = 0 WHERE id = ?")
            .bind(&record.id)
            .execute(&pool)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rejects_inverted_timestamps() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSyncRunRepository::new(pool);
        let mut record = run("t1", 100);
        record.started_at = 200;

        assert!(repo.insert(&record).await.is_err());
    }
}
