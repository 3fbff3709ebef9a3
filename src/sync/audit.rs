//! Sync audit log
//!
//! One append-only row per push batch, for operational dashboards. Nothing
//! in the sync protocol reads these rows back.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::types::SyncSummary;
use crate::db::encode_timestamp;
use crate::error::Result;

/// Kind of audited sync call; only push batches are recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Push,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Push => "push",
        }
    }
}

/// Audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncLog {
    pub id: String,
    #[serde(rename = "farmId")]
    pub farm_id: String,
    #[serde(rename = "syncType")]
    pub sync_type: String,
    #[serde(rename = "itemsCount")]
    pub items_count: i64,
    #[serde(rename = "successCount")]
    pub success_count: i64,
    #[serde(rename = "failureCount")]
    pub failure_count: i64,
    #[serde(rename = "conflictCount")]
    pub conflict_count: i64,
    #[serde(rename = "durationMs")]
    pub duration_ms: i64,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl SyncLog {
    pub fn new(farm_id: &str, sync_type: SyncType, summary: &SyncSummary, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            farm_id: farm_id.to_string(),
            sync_type: sync_type.as_str().to_string(),
            items_count: summary.total as i64,
            success_count: summary.synced as i64,
            failure_count: summary.failed as i64,
            conflict_count: summary.conflicts as i64,
            duration_ms: i64::try_from(duration_ms).unwrap_or(i64::MAX),
            created_at: encode_timestamp(&Utc::now()),
        }
    }
}

/// Writes and lists audit rows
#[derive(Clone)]
pub struct SyncAuditRecorder {
    pool: SqlitePool,
}

impl SyncAuditRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a row, best effort
    ///
    /// Failures are logged and swallowed; the batch outcome the caller
    /// already computed stands regardless.
    pub async fn record(&self, log: &SyncLog) {
        if let Err(e) = self.insert(log).await {
            tracing::warn!(
                farm_id = %log.farm_id,
                sync_type = %log.sync_type,
                error = %e,
                "Failed to record sync log"
            );
        }
    }

    async fn insert(&self, log: &SyncLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_logs (
                id, farm_id, sync_type, items_count, success_count,
                failure_count, conflict_count, duration_ms, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.farm_id)
        .bind(&log.sync_type)
        .bind(log.items_count)
        .bind(log.success_count)
        .bind(log.failure_count)
        .bind(log.conflict_count)
        .bind(log.duration_ms)
        .bind(&log.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent rows for a farm, newest first
    pub async fn list_for_farm(&self, farm_id: &str, limit: i64) -> Result<Vec<SyncLog>> {
        let logs = sqlx::query_as::<_, SyncLog>(
            r#"
            SELECT id, farm_id, sync_type, items_count, success_count,
                   failure_count, conflict_count, duration_ms, created_at
            FROM sync_logs
            WHERE farm_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(farm_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }
}
