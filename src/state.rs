//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::sync::{EntityRegistry, SyncAuditRecorder};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pub config: Config,
    pub db: SqlitePool,
    pub registry: EntityRegistry,
    pub audit: SyncAuditRecorder,
}

impl AppState {
    /// Create a new application state
    ///
    /// The entity registry is resolved once here and shared by every request.
    pub fn new(config: Config, db: SqlitePool) -> Self {
        let registry = EntityRegistry::sqlite(&db);
        Self::with_registry(config, db, registry)
    }

    /// Create state around a custom registry
    pub fn with_registry(config: Config, db: SqlitePool, registry: EntityRegistry) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                audit: SyncAuditRecorder::new(db.clone()),
                db,
                registry,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the entity registry
    pub fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    /// Get the sync audit recorder
    pub fn audit(&self) -> &SyncAuditRecorder {
        &self.inner.audit
    }
}
