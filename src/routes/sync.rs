//! Sync API endpoints
//!
//! Push and pull for offline mobile clients, plus the audit log listing.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::sync::{
    FeedPosition, PullFeedBuilder, PullRequest, PullResponse, PushReconciler, PushRequest,
    PushResponse, SyncLog,
};

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 500;

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/push", post(push_changes))
        .route("/pull", post(pull_changes))
        .route("/logs/:farm_id", get(list_sync_logs))
}

/// Push offline mutations to the server
///
/// Per-item problems are reported in the results; only an oversized batch
/// is rejected as a whole.
async fn push_changes(
    State(state): State<AppState>,
    Json(req): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    let max_items = state.config().sync.max_push_items;
    if req.items.len() > max_items {
        return Err(AppError::BadRequest(format!(
            "Too many items: {} > {}",
            req.items.len(),
            max_items
        )));
    }

    let reconciler = PushReconciler::new(state.registry(), state.audit());
    Ok(Json(reconciler.push(&req.items).await))
}

/// Pull changes since a watermark or cursor
async fn pull_changes(
    State(state): State<AppState>,
    Json(req): Json<PullRequest>,
) -> Result<Json<PullResponse>> {
    if req.farm_id.trim().is_empty() {
        return Err(AppError::BadRequest("farmId is required".to_string()));
    }

    let position = FeedPosition::parse(req.since.as_deref(), req.cursor.as_deref())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let builder = PullFeedBuilder::new(state.registry(), state.config().sync.pull_page_size);
    let entity_types = builder.resolve_types(req.entity_types.as_deref());
    let response = builder.pull(&req.farm_id, &position, &entity_types).await;

    tracing::debug!(
        farm_id = %req.farm_id,
        changes = response.changes.len(),
        has_more = response.has_more,
        "Pull served"
    );

    Ok(Json(response))
}

/// Query parameters for the audit log listing
#[derive(Debug, Deserialize)]
struct LogParams {
    limit: Option<i64>,
}

/// List recent sync batches for a farm
async fn list_sync_logs(
    State(state): State<AppState>,
    Path(farm_id): Path<String>,
    Query(params): Query<LogParams>,
) -> Result<Json<Vec<SyncLog>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let logs = state.audit().list_for_farm(&farm_id, limit).await?;
    Ok(Json(logs))
}
