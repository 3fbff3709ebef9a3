//! SQLite entity store
//!
//! One handle per entity table. Every table has the same shape (see
//! `db::schema`), so a single implementation serves the whole registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::SqlitePool;

use super::error::{StoreError, StoreResult};
use super::registry::{EntityStore, EntityType};
use crate::db::{decode_timestamp, encode_timestamp};

/// Keys owned by the store; clients cannot write them through a payload
pub const RESERVED_FIELDS: [&str; 6] = ["id", "farmId", "version", "deletedAt", "createdAt", "updatedAt"];

const COLUMNS: &str = "farm_id, id, data, version, deleted_at, created_at, updated_at";

/// A stored entity as seen by the sync engine
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub id: String,
    pub farm_id: String,
    pub fields: Map<String, Value>,
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Full client-facing snapshot: stored fields plus metadata
    pub fn snapshot(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object.insert("farmId".to_string(), Value::String(self.farm_id.clone()));
        object.insert("version".to_string(), Value::from(self.version));
        object.insert(
            "deletedAt".to_string(),
            self.deleted_at
                .as_ref()
                .map(|ts| Value::String(encode_timestamp(ts)))
                .unwrap_or(Value::Null),
        );
        object.insert(
            "createdAt".to_string(),
            Value::String(encode_timestamp(&self.created_at)),
        );
        object.insert(
            "updatedAt".to_string(),
            Value::String(encode_timestamp(&self.updated_at)),
        );
        Value::Object(object)
    }
}

/// Lower bound of a change query
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeFilter {
    /// `updated_at > ts`
    After(DateTime<Utc>),
    /// `updated_at >= ts`
    AtOrAfter(DateTime<Utc>),
    /// `(updated_at, id) > (ts, id)`
    AfterKey { updated_at: DateTime<Utc>, id: String },
}

/// Drop store-owned keys from a client payload
pub fn strip_reserved(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Entity store backed by one SQLite table
#[derive(Clone)]
pub struct SqliteEntityStore {
    pool: SqlitePool,
    entity_type: EntityType,
    table: &'static str,
}

impl SqliteEntityStore {
    pub fn new(pool: SqlitePool, entity_type: EntityType) -> Self {
        Self {
            pool,
            entity_type,
            table: entity_type.table(),
        }
    }

    async fn current_version(&self, farm_id: &str, id: &str) -> StoreResult<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT version FROM {} WHERE farm_id = ? AND id = ?",
            self.table
        ))
        .bind(farm_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(v,)| v))
    }
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    async fn get_by_id(&self, farm_id: &str, id: &str) -> StoreResult<Option<EntityRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {COLUMNS} FROM {} WHERE farm_id = ? AND id = ?",
            self.table
        ))
        .bind(farm_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RecordRow::into_record).transpose()
    }

    async fn create_with_id(
        &self,
        farm_id: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> StoreResult<EntityRecord> {
        let now = encode_timestamp(&Utc::now());
        let data = serde_json::to_string(&strip_reserved(fields))?;

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} (farm_id, id, data, version, deleted_at, created_at, updated_at)
            VALUES (?, ?, ?, 1, NULL, ?, ?)
            ON CONFLICT(farm_id, id) DO NOTHING
            "#,
            self.table
        ))
        .bind(farm_id)
        .bind(id)
        .bind(&data)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }

        self.get_by_id(farm_id, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update_if_version(
        &self,
        farm_id: &str,
        id: &str,
        expected_version: i64,
        fields: &Map<String, Value>,
    ) -> StoreResult<EntityRecord> {
        let current = self
            .get_by_id(farm_id, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if current.version != expected_version {
            return Err(StoreError::VersionMismatch {
                expected: expected_version,
                current: Some(current.version),
            });
        }

        let mut merged = current.fields;
        merged.extend(strip_reserved(fields));
        let data = serde_json::to_string(&merged)?;
        let now = encode_timestamp(&Utc::now());

        // The version predicate makes this the compare-and-swap; the read
        // above only builds the merged document.
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET data = ?, version = version + 1, updated_at = MAX(updated_at, ?)
            WHERE farm_id = ? AND id = ? AND version = ?
            "#,
            self.table
        ))
        .bind(&data)
        .bind(&now)
        .bind(farm_id)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionMismatch {
                expected: expected_version,
                current: self.current_version(farm_id, id).await?,
            });
        }

        self.get_by_id(farm_id, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn soft_delete(&self, farm_id: &str, id: &str) -> StoreResult<Option<EntityRecord>> {
        let now = encode_timestamp(&Utc::now());

        sqlx::query(&format!(
            r#"
            UPDATE {}
            SET deleted_at = ?, version = version + 1, updated_at = MAX(updated_at, ?)
            WHERE farm_id = ? AND id = ? AND deleted_at IS NULL
            "#,
            self.table
        ))
        .bind(&now)
        .bind(&now)
        .bind(farm_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        // Missing rows stay missing, existing tombstones come back untouched
        self.get_by_id(farm_id, id).await
    }

    async fn changed_since(
        &self,
        farm_id: &str,
        filter: &ChangeFilter,
        limit: usize,
    ) -> StoreResult<Vec<EntityRecord>> {
        let condition = match filter {
            ChangeFilter::After(_) => "updated_at > ?",
            ChangeFilter::AtOrAfter(_) => "updated_at >= ?",
            ChangeFilter::AfterKey { .. } => "(updated_at > ? OR (updated_at = ? AND id > ?))",
        };

        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM {}
            WHERE farm_id = ? AND {condition}
            ORDER BY updated_at ASC, id ASC
            LIMIT ?
            "#,
            self.table
        );

        let mut query = sqlx::query_as::<_, RecordRow>(&sql).bind(farm_id);
        query = match filter {
            ChangeFilter::After(ts) | ChangeFilter::AtOrAfter(ts) => query.bind(encode_timestamp(ts)),
            ChangeFilter::AfterKey { updated_at, id } => {
                let ts = encode_timestamp(updated_at);
                query.bind(ts.clone()).bind(ts).bind(id.clone())
            }
        };

        let rows = query
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    farm_id: String,
    id: String,
    data: String,
    version: i64,
    deleted_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RecordRow {
    fn into_record(self) -> StoreResult<EntityRecord> {
        let fields = match serde_json::from_str(&self.data)? {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Corrupt(format!(
                    "record {} holds non-object data: {}",
                    self.id, other
                )))
            }
        };

        Ok(EntityRecord {
            fields,
            version: self.version,
            deleted_at: self.deleted_at.as_deref().map(decode_timestamp).transpose()?,
            created_at: decode_timestamp(&self.created_at)?,
            updated_at: decode_timestamp(&self.updated_at)?,
            id: self.id,
            farm_id: self.farm_id,
        })
    }
}
