//! Version guard
//!
//! Optimistic-concurrency classification. The server always wins: a
//! conflict hands the stored state back to the client and never writes.

use super::store::EntityRecord;

/// Outcome of comparing a client mutation against stored state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Write against this stored version
    Apply { base_version: i64 },
    /// Leave the server untouched and report its version
    Conflict { server_version: i64 },
}

/// Create is only valid when nothing (live or tombstoned) holds the id
pub fn check_create(existing: Option<&EntityRecord>) -> Verdict {
    match existing {
        None => Verdict::Apply { base_version: 0 },
        Some(record) => Verdict::Conflict {
            server_version: record.version,
        },
    }
}

/// Update is applied unless the client edited a stale base
///
/// A missing `client_version` is treated as "latest", as is a version ahead
/// of the server's. Tombstones are updated like any other stored record.
pub fn check_update(stored: &EntityRecord, client_version: Option<i64>) -> Verdict {
    let stale = client_version.is_some_and(|v| v < stored.version);

    if stale {
        Verdict::Conflict {
            server_version: stored.version,
        }
    } else {
        Verdict::Apply {
            base_version: stored.version,
        }
    }
}
