//! Offline sync engine
//!
//! Provides:
//! - A registry of typed entity stores sharing one capability contract
//! - Optimistic-concurrency checks on a per-record version
//! - Push reconciliation of offline mutation batches
//! - A paginated, globally ordered change feed for pulls
//! - An audit row per push batch
//!
//! # Sync Protocol
//!
//! 1. Client sends `PushRequest` with mutations recorded offline
//! 2. Server applies each item independently, in order
//! 3. Stale or duplicate items come back as conflicts carrying server state
//! 4. Client re-bases conflicted edits and pushes again, or drops them
//! 5. Client sends `PullRequest` with its watermark (or `nextCursor`) until
//!    `hasMore` is false
//!
//! # Conflict Resolution
//!
//! - Server wins: a conflict never overwrites stored state
//! - No field-level merging; the client resolves
//! - Deletes are idempotent and ignore the client version

mod audit;
mod error;
mod pull;
mod push;
mod registry;
mod store;
mod types;
mod version;

pub use audit::{SyncAuditRecorder, SyncLog, SyncType};
pub use error::{StoreError, StoreResult, SyncError};
pub use pull::{FeedPosition, InvalidPosition, PullFeedBuilder};
pub use push::PushReconciler;
pub use registry::{EntityRegistry, EntityStore, EntityType};
pub use store::{ChangeFilter, EntityRecord, SqliteEntityStore};
pub use types::{
    Change, ChangeAction, ChangeCursor, InvalidCursor, PullRequest, PullResponse, PushRequest,
    PushResponse, SyncAction, SyncItem, SyncOutcome, SyncResult, SyncSummary,
};
pub use version::{check_create, check_update, Verdict};
