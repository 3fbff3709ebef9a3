//! Sync data types
//!
//! Wire types for the push/pull protocol:
//! - Client mutations and their per-item outcomes
//! - Batch summaries
//! - The change feed and its resume cursor

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::error::SyncError;
use super::registry::EntityType;
use super::store::EntityRecord;
use crate::db::{decode_timestamp, encode_timestamp};

/// Mutation kinds a client can record offline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    /// Parse a wire action; unknown actions are `None`
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "CREATE" => Some(SyncAction::Create),
            "UPDATE" => Some(SyncAction::Update),
            "DELETE" => Some(SyncAction::Delete),
            _ => None,
        }
    }
}

/// One client-side mutation
///
/// `entity_type` and `action` stay raw strings so an unknown tag fails its
/// own item instead of the whole request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItem {
    /// Client-generated idempotency key
    pub id: String,
    #[serde(rename = "entityType")]
    pub entity_type: String,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
    /// Base version the client edited; absent for creates
    #[serde(rename = "clientVersion", default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<i64>,
    #[serde(rename = "farmId")]
    pub farm_id: String,
}

/// Terminal outcome of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncOutcome {
    Synced {
        /// Absent when deleting something that never existed
        #[serde(rename = "newVersion", default, skip_serializing_if = "Option::is_none")]
        new_version: Option<i64>,
    },
    Conflict {
        #[serde(rename = "serverVersion")]
        server_version: i64,
        #[serde(rename = "serverData")]
        server_data: Value,
    },
    Failed {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

/// Server answer for one `SyncItem`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Echoes `SyncItem::id`
    pub id: String,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

impl SyncResult {
    pub fn synced(item: &SyncItem, new_version: Option<i64>) -> Self {
        Self::new(item, SyncOutcome::Synced { new_version })
    }

    pub fn from_error(item: &SyncItem, error: SyncError) -> Self {
        let outcome = match error {
            SyncError::VersionConflict {
                server_version,
                server_data,
            }
            | SyncError::DuplicateEntity {
                server_version,
                server_data,
            } => SyncOutcome::Conflict {
                server_version,
                server_data,
            },
            other => SyncOutcome::Failed {
                error_message: other.to_string(),
            },
        };
        Self::new(item, outcome)
    }

    fn new(item: &SyncItem, outcome: SyncOutcome) -> Self {
        Self {
            id: item.id.clone(),
            entity_id: item.entity_id.clone(),
            outcome,
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Synced { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Conflict { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Failed { .. })
    }
}

/// Per-batch outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub total: usize,
    pub synced: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl SyncSummary {
    pub fn from_results(results: &[SyncResult]) -> Self {
        Self {
            total: results.len(),
            synced: results.iter().filter(|r| r.is_synced()).count(),
            conflicts: results.iter().filter(|r| r.is_conflict()).count(),
            failed: results.iter().filter(|r| r.is_failed()).count(),
        }
    }
}

/// Request to push offline mutations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub items: Vec<SyncItem>,
}

/// Response from push operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    /// One result per item, in submission order
    pub results: Vec<SyncResult>,
    #[serde(rename = "serverTimestamp")]
    pub server_timestamp: String,
    pub summary: SyncSummary,
}

/// Kind of change in the pull feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Update,
    Delete,
}

/// One entry of the change feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    pub action: ChangeAction,
    /// Full record snapshot
    pub data: Value,
    pub version: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

impl Change {
    pub fn from_record(entity_type: EntityType, record: &EntityRecord) -> Self {
        Self {
            entity_type,
            entity_id: record.id.clone(),
            action: if record.is_deleted() {
                ChangeAction::Delete
            } else {
                ChangeAction::Update
            },
            data: record.snapshot(),
            version: record.version,
            updated_at: encode_timestamp(&record.updated_at),
        }
    }
}

/// Request to pull changes from server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(rename = "farmId")]
    pub farm_id: String,
    /// Watermark; defaults to the epoch (full resync)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    /// Defaults to every registered type
    #[serde(rename = "entityTypes", default, skip_serializing_if = "Option::is_none")]
    pub entity_types: Option<Vec<String>>,
    /// Resume key from a previous `nextCursor`; wins over `since`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Response from pull operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub changes: Vec<Change>,
    #[serde(rename = "serverTimestamp")]
    pub server_timestamp: String,
    /// Whether another pull may return more changes
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    /// Cursor of the last returned change
    #[serde(rename = "nextCursor", default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Position in the global change order: `(updated_at, entity_type, entity_id)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChangeCursor {
    pub updated_at: DateTime<Utc>,
    pub entity_type: EntityType,
    pub entity_id: String,
}

#[derive(Debug, Error)]
#[error("Invalid cursor: {0}")]
pub struct InvalidCursor(pub String);

impl ChangeCursor {
    pub fn of(entity_type: EntityType, record: &EntityRecord) -> Self {
        Self {
            updated_at: record.updated_at,
            entity_type,
            entity_id: record.id.clone(),
        }
    }
}

impl fmt::Display for ChangeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            encode_timestamp(&self.updated_at),
            self.entity_type,
            self.entity_id
        )
    }
}

impl FromStr for ChangeCursor {
    type Err = InvalidCursor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Entity ids may contain the separator, so they come last
        let mut parts = s.splitn(3, '|');
        let (Some(ts), Some(tag), Some(id)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(InvalidCursor(s.to_string()));
        };

        Ok(Self {
            updated_at: decode_timestamp(ts).map_err(|_| InvalidCursor(s.to_string()))?,
            entity_type: EntityType::from_tag(tag).ok_or_else(|| InvalidCursor(s.to_string()))?,
            entity_id: id.to_string(),
        })
    }
}
