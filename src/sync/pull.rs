//! Pull feed builder
//!
//! Merges per-type change queries into one feed ordered by
//! `(updated_at, entity_type, entity_id)`. A page may be resumed either from
//! a plain timestamp watermark or from the compound cursor of the last
//! change returned, which never skips records sharing one timestamp.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::registry::{EntityRegistry, EntityType};
use super::store::{ChangeFilter, EntityRecord};
use super::types::{Change, ChangeCursor, InvalidCursor, PullResponse};
use crate::db::{decode_timestamp, encode_timestamp};

/// Where a pull starts
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPosition {
    /// Everything with `updated_at` strictly after the watermark
    Since(DateTime<Utc>),
    /// Everything strictly after this key in feed order
    After(ChangeCursor),
}

#[derive(Debug, Error)]
pub enum InvalidPosition {
    #[error("Invalid since timestamp: {0}")]
    Since(String),

    #[error(transparent)]
    Cursor(#[from] InvalidCursor),
}

impl FeedPosition {
    /// Parse request parameters; a cursor takes precedence over `since`,
    /// and neither means a full resync from the epoch
    pub fn parse(since: Option<&str>, cursor: Option<&str>) -> Result<Self, InvalidPosition> {
        if let Some(cursor) = cursor {
            return Ok(FeedPosition::After(cursor.parse()?));
        }

        match since {
            Some(since) => decode_timestamp(since)
                .map(FeedPosition::Since)
                .map_err(|_| InvalidPosition::Since(since.to_string())),
            None => Ok(FeedPosition::Since(DateTime::<Utc>::UNIX_EPOCH)),
        }
    }

    /// Translate the global position into one entity type's lower bound
    fn filter_for(&self, entity_type: EntityType) -> ChangeFilter {
        match self {
            FeedPosition::Since(ts) => ChangeFilter::After(*ts),
            FeedPosition::After(cursor) => match entity_type.cmp(&cursor.entity_type) {
                // Types ordered before the cursor's already returned its timestamp bucket
                Ordering::Less => ChangeFilter::After(cursor.updated_at),
                Ordering::Equal => ChangeFilter::AfterKey {
                    updated_at: cursor.updated_at,
                    id: cursor.entity_id.clone(),
                },
                Ordering::Greater => ChangeFilter::AtOrAfter(cursor.updated_at),
            },
        }
    }
}

/// Builds change pages from every requested entity type
pub struct PullFeedBuilder<'a> {
    registry: &'a EntityRegistry,
    page_size: usize,
}

impl<'a> PullFeedBuilder<'a> {
    pub fn new(registry: &'a EntityRegistry, page_size: usize) -> Self {
        Self {
            registry,
            page_size: page_size.max(1),
        }
    }

    /// Requested tags that have a registered handle; all of them when `None`
    pub fn resolve_types(&self, tags: Option<&[String]>) -> Vec<EntityType> {
        let Some(tags) = tags else {
            return self.registry.entity_types().collect();
        };

        let mut types = Vec::with_capacity(tags.len());
        for tag in tags {
            match EntityType::from_tag(tag).filter(|t| self.registry.handle(*t).is_some()) {
                Some(entity_type) if !types.contains(&entity_type) => types.push(entity_type),
                Some(_) => {}
                None => tracing::warn!(tag = %tag, "Ignoring unknown entity type in pull"),
            }
        }
        types
    }

    /// Build one page of the feed for `farm_id`
    pub async fn pull(
        &self,
        farm_id: &str,
        position: &FeedPosition,
        entity_types: &[EntityType],
    ) -> PullResponse {
        let queries = entity_types
            .iter()
            .map(|&entity_type| self.query_type(farm_id, position, entity_type));
        let batches = futures::future::join_all(queries).await;

        let mut merged: Vec<(EntityType, EntityRecord)> = batches.into_iter().flatten().collect();
        merged.sort_by(|(type_a, a), (type_b, b)| {
            (a.updated_at, type_a, &a.id).cmp(&(b.updated_at, type_b, &b.id))
        });

        // Approximate: only the merged count is compared against the cap
        let has_more = merged.len() >= self.page_size;
        merged.truncate(self.page_size);

        let next_cursor = merged
            .last()
            .map(|(entity_type, record)| ChangeCursor::of(*entity_type, record).to_string());
        let changes = merged
            .iter()
            .map(|(entity_type, record)| Change::from_record(*entity_type, record))
            .collect();

        PullResponse {
            changes,
            server_timestamp: encode_timestamp(&Utc::now()),
            has_more,
            next_cursor,
        }
    }

    /// One type's page; a failing type is logged and contributes nothing
    async fn query_type(
        &self,
        farm_id: &str,
        position: &FeedPosition,
        entity_type: EntityType,
    ) -> Vec<(EntityType, EntityRecord)> {
        let Some(store) = self.registry.handle(entity_type) else {
            return Vec::new();
        };

        let filter = position.filter_for(entity_type);
        match store.changed_since(farm_id, &filter, self.page_size).await {
            Ok(records) => records.into_iter().map(|r| (entity_type, r)).collect(),
            Err(e) => {
                tracing::warn!(
                    farm_id = %farm_id,
                    entity_type = %entity_type,
                    error = %e,
                    "Skipping entity type in pull"
                );
                Vec::new()
            }
        }
    }
}
