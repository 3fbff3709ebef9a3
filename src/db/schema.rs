//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;
use crate::sync::EntityType;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    for entity_type in EntityType::ALL {
        sqlx::query(&entity_table_sql(entity_type.table()))
            .execute(pool)
            .await?;
    }

    sqlx::query(SYNC_LOG_SQL).execute(pool).await?;

    Ok(())
}

/// Every syncable entity table shares one shape: tenant-scoped key, opaque
/// JSON fields, and the version/soft-delete/timestamp columns sync needs.
fn entity_table_sql(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    farm_id TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL DEFAULT '{{}}',
    version INTEGER NOT NULL DEFAULT 1,
    deleted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (farm_id, id)
);

CREATE INDEX IF NOT EXISTS idx_{table}_changes ON {table}(farm_id, updated_at, id);
"#
    )
}

const SYNC_LOG_SQL: &str = r#"
-- One row per push batch, append-only
CREATE TABLE IF NOT EXISTS sync_logs (
    id TEXT PRIMARY KEY,
    farm_id TEXT NOT NULL,
    sync_type TEXT NOT NULL,
    items_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    conflict_count INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_logs_farm ON sync_logs(farm_id, created_at);
"#;
