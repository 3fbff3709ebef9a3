//! Entity registry
//!
//! Maps the closed set of entity-type tags to store handles sharing one
//! capability contract, so the reconciler and the feed builder are written
//! once for every business entity.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::SqlitePool;

use super::error::StoreResult;
use super::store::{ChangeFilter, EntityRecord, SqliteEntityStore};

/// Syncable entity types
///
/// Variants are declared in tag order; the derived `Ord` is the tie-break
/// order of the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Animal,
    Breeding,
    Campaign,
    Document,
    Lot,
    LotAnimal,
    Movement,
    Treatment,
    Vaccination,
    Weight,
}

impl EntityType {
    pub const ALL: [EntityType; 10] = [
        EntityType::Animal,
        EntityType::Breeding,
        EntityType::Campaign,
        EntityType::Document,
        EntityType::Lot,
        EntityType::LotAnimal,
        EntityType::Movement,
        EntityType::Treatment,
        EntityType::Vaccination,
        EntityType::Weight,
    ];

    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Animal => "ANIMAL",
            EntityType::Breeding => "BREEDING",
            EntityType::Campaign => "CAMPAIGN",
            EntityType::Document => "DOCUMENT",
            EntityType::Lot => "LOT",
            EntityType::LotAnimal => "LOT_ANIMAL",
            EntityType::Movement => "MOVEMENT",
            EntityType::Treatment => "TREATMENT",
            EntityType::Vaccination => "VACCINATION",
            EntityType::Weight => "WEIGHT",
        }
    }

    /// Backing table
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Animal => "animals",
            EntityType::Breeding => "breedings",
            EntityType::Campaign => "campaigns",
            EntityType::Document => "documents",
            EntityType::Lot => "lots",
            EntityType::LotAnimal => "lot_animals",
            EntityType::Movement => "movements",
            EntityType::Treatment => "treatments",
            EntityType::Vaccination => "vaccinations",
            EntityType::Weight => "weights",
        }
    }

    /// Parse a wire tag; unknown tags are `None`, not an error
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability contract every registered entity store provides
///
/// `update_if_version` must be a single atomic compare-and-swap: two writers
/// passing the same `expected_version` can never both succeed.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Entity type served by this handle
    fn entity_type(&self) -> EntityType;

    /// Fetch a record, tombstones included
    async fn get_by_id(&self, farm_id: &str, id: &str) -> StoreResult<Option<EntityRecord>>;

    /// Insert a record at version 1 under a caller-chosen id
    async fn create_with_id(
        &self,
        farm_id: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> StoreResult<EntityRecord>;

    /// Overlay `fields` and bump the version, only if it is still `expected_version`
    async fn update_if_version(
        &self,
        farm_id: &str,
        id: &str,
        expected_version: i64,
        fields: &Map<String, Value>,
    ) -> StoreResult<EntityRecord>;

    /// Mark a record deleted; `None` when it does not exist
    async fn soft_delete(&self, farm_id: &str, id: &str) -> StoreResult<Option<EntityRecord>>;

    /// Records matching `filter`, ascending by `(updated_at, id)`
    async fn changed_since(
        &self,
        farm_id: &str,
        filter: &ChangeFilter,
        limit: usize,
    ) -> StoreResult<Vec<EntityRecord>>;
}

/// Typed handles keyed by entity type, built once at startup
#[derive(Clone, Default)]
pub struct EntityRegistry {
    stores: BTreeMap<EntityType, Arc<dyn EntityStore>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a SQLite-backed handle for every entity type
    pub fn sqlite(pool: &SqlitePool) -> Self {
        let mut registry = Self::new();
        for entity_type in EntityType::ALL {
            registry.register(Arc::new(SqliteEntityStore::new(pool.clone(), entity_type)));
        }
        registry
    }

    /// Register (or replace) the handle for its entity type
    pub fn register(&mut self, store: Arc<dyn EntityStore>) {
        self.stores.insert(store.entity_type(), store);
    }

    pub fn handle(&self, entity_type: EntityType) -> Option<&Arc<dyn EntityStore>> {
        self.stores.get(&entity_type)
    }

    /// Resolve a wire tag to its handle
    pub fn resolve(&self, tag: &str) -> Option<&Arc<dyn EntityStore>> {
        EntityType::from_tag(tag).and_then(|t| self.handle(t))
    }

    /// Registered entity types, in tag order
    pub fn entity_types(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.stores.keys().copied()
    }
}
