//! Record store boundary
//!
//! The runtime consumes persistence through the [`RecordStore`] trait and
//! never issues raw query strings; every condition travels as a structured
//! [`Filter`] with bound values. [`MemoryStore`] is the in-process
//! implementation used by the engine's tests and by embedders without an
//! external store.

use crate::error::StoreError;
use crate::filter::{matches_all, Filter};
use crate::record::{DocStatus, EntityId, EntityType, Record};
use async_trait::async_trait;
use dashmap::DashMap;

/// Persisted state of one entity instance
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Lifecycle status at last persist
    pub status: DocStatus,
    /// Field values at last persist
    pub fields: Record,
}

/// Persistence boundary consumed by the lifecycle engine
///
/// Implementations must treat every filter value as a bound parameter.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record, optionally projected to the named fields
    ///
    /// Returns `Ok(None)` when the instance does not exist.
    async fn get(
        &self,
        entity_type: &EntityType,
        id: &EntityId,
        fields: Option<&[String]>,
    ) -> Result<Option<StoredRecord>, StoreError>;

    /// Persist a record's status and fields (upsert)
    async fn set(
        &self,
        entity_type: &EntityType,
        id: &EntityId,
        status: DocStatus,
        fields: &Record,
    ) -> Result<(), StoreError>;

    /// Whether the instance exists
    async fn exists(&self, entity_type: &EntityType, id: &EntityId) -> Result<bool, StoreError>;

    /// Count instances matching all filters
    async fn count(&self, entity_type: &EntityType, filters: &[Filter]) -> Result<usize, StoreError>;

    /// List instances matching all filters
    ///
    /// Permission gating of the results is the engine's responsibility; the
    /// store returns raw matches.
    async fn list(
        &self,
        entity_type: &EntityType,
        filters: &[Filter],
    ) -> Result<Vec<(EntityId, StoredRecord)>, StoreError>;
}

/// In-memory record store
///
/// Concurrent map keyed by (type, id); suitable for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<(EntityType, EntityId), StoredRecord>,
}

impl MemoryStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored records, across all types
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(
        &self,
        entity_type: &EntityType,
        id: &EntityId,
        fields: Option<&[String]>,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let key = (entity_type.clone(), *id);
        Ok(self.records.get(&key).map(|entry| match fields {
            Some(names) => StoredRecord {
                status: entry.status,
                fields: entry.fields.project(names),
            },
            None => entry.clone(),
        }))
    }

    async fn set(
        &self,
        entity_type: &EntityType,
        id: &EntityId,
        status: DocStatus,
        fields: &Record,
    ) -> Result<(), StoreError> {
        let key = (entity_type.clone(), *id);
        self.records.insert(
            key,
            StoredRecord {
                status,
                fields: fields.clone(),
            },
        );
        Ok(())
    }

    async fn exists(&self, entity_type: &EntityType, id: &EntityId) -> Result<bool, StoreError> {
        let key = (entity_type.clone(), *id);
        Ok(self.records.contains_key(&key))
    }

    async fn count(&self, entity_type: &EntityType, filters: &[Filter]) -> Result<usize, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.key().0 == *entity_type && matches_all(filters, &entry.fields))
            .count())
    }

    async fn list(
        &self,
        entity_type: &EntityType,
        filters: &[Filter],
    ) -> Result<Vec<(EntityId, StoredRecord)>, StoreError> {
        let mut out: Vec<(EntityId, StoredRecord)> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == *entity_type && matches_all(filters, &entry.fields))
            .map(|entry| (entry.key().1, entry.clone()))
            .collect();
        // Deterministic order for callers and tests
        out.sort_by_key(|(id, _)| *id);
        Ok(out)
    }
}
