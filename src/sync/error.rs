//! Sync error types
//!
//! `StoreError` is what an entity store handle reports. `SyncError` is the
//! per-item outcome taxonomy of the push reconciler; every variant ends up
//! inside a `SyncResult`, none of them fail the request.

use serde_json::Value;
use thiserror::Error;

/// Errors reported by an entity store handle
#[derive(Debug, Error)]
pub enum StoreError {
    /// Conditional write lost: the stored version no longer matches
    #[error("Version mismatch: expected {expected}, found {current:?}")]
    VersionMismatch { expected: i64, current: Option<i64> },

    /// Insert collided with an existing key
    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored row could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

impl From<chrono::ParseError> for StoreError {
    fn from(e: chrono::ParseError) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Per-item reconciliation errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Unknown entity type")]
    UnknownEntityType(String),

    #[error("Unknown action")]
    UnknownAction(String),

    #[error("Entity not found")]
    EntityNotFound,

    /// Client edited a stale base version
    #[error("Version conflict: server is at version {server_version}")]
    VersionConflict {
        server_version: i64,
        server_data: Value,
    },

    /// Create against an id that already exists
    #[error("Entity already exists at version {server_version}")]
    DuplicateEntity {
        server_version: i64,
        server_data: Value,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),
}
