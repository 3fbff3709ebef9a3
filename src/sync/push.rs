//! Push reconciler
//!
//! Applies a batch of offline mutations one item at a time, in submission
//! order. Each item ends in its own `SyncResult`; no item can abort the
//! batch, and committed items are never rolled back.

use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};

use super::audit::{SyncAuditRecorder, SyncLog, SyncType};
use super::error::{StoreError, SyncError};
use super::registry::{EntityRegistry, EntityStore};
use super::store::EntityRecord;
use super::types::{PushResponse, SyncAction, SyncItem, SyncResult, SyncSummary};
use super::version::{check_create, check_update, Verdict};
use crate::db::encode_timestamp;

/// Reconciles client batches against the registry
pub struct PushReconciler<'a> {
    registry: &'a EntityRegistry,
    audit: &'a SyncAuditRecorder,
}

impl<'a> PushReconciler<'a> {
    pub fn new(registry: &'a EntityRegistry, audit: &'a SyncAuditRecorder) -> Self {
        Self { registry, audit }
    }

    /// Reconcile every item, record the batch, and report per-item outcomes
    pub async fn push(&self, items: &[SyncItem]) -> PushResponse {
        let started = Instant::now();
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let result = match self.reconcile(item).await {
                Ok(new_version) => SyncResult::synced(item, new_version),
                Err(e) => {
                    tracing::debug!(
                        item_id = %item.id,
                        entity_type = %item.entity_type,
                        entity_id = %item.entity_id,
                        error = %e,
                        "Sync item not applied"
                    );
                    SyncResult::from_error(item, e)
                }
            };
            results.push(result);
        }

        let summary = SyncSummary::from_results(&results);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        // Batches are expected to be single-tenant; the first item labels the row
        if let Some(first) = items.first() {
            let log = SyncLog::new(&first.farm_id, SyncType::Push, &summary, duration_ms);
            self.audit.record(&log).await;

            tracing::info!(
                farm_id = %first.farm_id,
                total = summary.total,
                synced = summary.synced,
                conflicts = summary.conflicts,
                failed = summary.failed,
                duration_ms,
                "Push batch reconciled"
            );
        }

        PushResponse {
            results,
            server_timestamp: encode_timestamp(&Utc::now()),
            summary,
        }
    }

    /// Apply one item; `Ok` carries the version the client should now hold
    async fn reconcile(&self, item: &SyncItem) -> Result<Option<i64>, SyncError> {
        let store = self
            .registry
            .resolve(&item.entity_type)
            .ok_or_else(|| SyncError::UnknownEntityType(item.entity_type.clone()))?;
        let action = SyncAction::parse(&item.action)
            .ok_or_else(|| SyncError::UnknownAction(item.action.clone()))?;

        let empty = Map::new();
        let fields = item.payload.as_ref().unwrap_or(&empty);
        let store: &dyn EntityStore = store.as_ref();

        match action {
            SyncAction::Create => create(store, item, fields).await.map(Some),
            SyncAction::Update => update(store, item, fields).await.map(Some),
            SyncAction::Delete => delete(store, item).await,
        }
    }
}

async fn create(
    store: &dyn EntityStore,
    item: &SyncItem,
    fields: &Map<String, Value>,
) -> Result<i64, SyncError> {
    let existing = store.get_by_id(&item.farm_id, &item.entity_id).await?;
    if let (Verdict::Conflict { .. }, Some(record)) = (check_create(existing.as_ref()), &existing) {
        return Err(duplicate(record));
    }

    match store
        .create_with_id(&item.farm_id, &item.entity_id, fields)
        .await
    {
        Ok(record) => Ok(record.version),
        // Another writer inserted the id since our read
        Err(StoreError::AlreadyExists(id)) => {
            match store.get_by_id(&item.farm_id, &item.entity_id).await? {
                Some(record) => Err(duplicate(&record)),
                None => Err(StoreError::NotFound(id).into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

async fn update(
    store: &dyn EntityStore,
    item: &SyncItem,
    fields: &Map<String, Value>,
) -> Result<i64, SyncError> {
    let stored = store
        .get_by_id(&item.farm_id, &item.entity_id)
        .await?
        .ok_or(SyncError::EntityNotFound)?;

    let base_version = match check_update(&stored, item.client_version) {
        Verdict::Apply { base_version } => base_version,
        Verdict::Conflict { .. } => return Err(stale(&stored)),
    };

    match store
        .update_if_version(&item.farm_id, &item.entity_id, base_version, fields)
        .await
    {
        // The swap succeeded against `base_version`, so this write produced
        // exactly the next version even if another writer has since moved on
        Ok(_) => Ok(base_version + 1),
        Err(StoreError::VersionMismatch { .. }) => {
            let current = store
                .get_by_id(&item.farm_id, &item.entity_id)
                .await?
                .ok_or(SyncError::EntityNotFound)?;
            Err(stale(&current))
        }
        Err(StoreError::NotFound(_)) => Err(SyncError::EntityNotFound),
        Err(e) => Err(e.into()),
    }
}

async fn delete(store: &dyn EntityStore, item: &SyncItem) -> Result<Option<i64>, SyncError> {
    let Some(stored) = store.get_by_id(&item.farm_id, &item.entity_id).await? else {
        // Already gone: replayed deletes are not errors
        return Ok(None);
    };

    if stored.is_deleted() {
        return Ok(Some(stored.version));
    }

    let deleted = store.soft_delete(&item.farm_id, &item.entity_id).await?;
    Ok(deleted.map(|record| record.version))
}

fn duplicate(record: &EntityRecord) -> SyncError {
    SyncError::DuplicateEntity {
        server_version: record.version,
        server_data: record.snapshot(),
    }
}

fn stale(record: &EntityRecord) -> SyncError {
    SyncError::VersionConflict {
        server_version: record.version,
        server_data: record.snapshot(),
    }
}
