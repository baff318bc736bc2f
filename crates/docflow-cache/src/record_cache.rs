//! Record-backed cached lookups
//!
//! [`RecordCache`] fronts the record store for read-mostly lookups such as a
//! singleton configuration record. The lifecycle engine invalidates the
//! matching entry on every write it persists, so cached reads through the
//! engine never outlive the record they mirror; the TTL is a backstop for
//! writes that bypass the engine.

use crate::ttl::TtlCache;
use docflow_store::{EntityId, EntityType, RecordStore, StoreError, StoredRecord};
use std::sync::Arc;
use std::time::Duration;

/// Cache of whole records keyed by (type, id)
#[derive(Clone)]
pub struct RecordCache {
    entries: TtlCache<Arc<StoredRecord>>,
}

impl RecordCache {
    /// Create a record cache with capacity and backstop TTL
    #[must_use]
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            entries: TtlCache::new(max_capacity, ttl),
        }
    }

    fn key(entity_type: &EntityType, id: &EntityId) -> String {
        format!("{entity_type}/{id}")
    }

    /// Fetch a record through the cache, loading from the store on a miss
    ///
    /// A store miss (absent record) is not cached; the next read goes back to
    /// the store.
    pub async fn get_or_load(
        &self,
        store: &dyn RecordStore,
        entity_type: &EntityType,
        id: &EntityId,
    ) -> Result<Option<Arc<StoredRecord>>, StoreError> {
        let key = Self::key(entity_type, id);
        if let Some(cached) = self.entries.get(&key).await {
            tracing::debug!("record cache hit: {key}");
            return Ok(Some(cached));
        }

        match store.get(entity_type, id, None).await? {
            Some(record) => {
                let record = Arc::new(record);
                self.entries.set(key, Arc::clone(&record)).await;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Drop the cached copy of a record
    ///
    /// Called by the engine after every persist so subsequent reads observe
    /// the new state.
    pub async fn invalidate(&self, entity_type: &EntityType, id: &EntityId) {
        self.entries.invalidate(&Self::key(entity_type, id)).await;
    }

    /// Drop all cached records
    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_store::{DocStatus, MemoryStore, Record};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn loads_and_caches() {
        let store = MemoryStore::new();
        let cache = RecordCache::new(100, Duration::from_secs(60));
        let entity_type = EntityType::new("settings");
        let id = EntityId::new();

        store
            .set(&entity_type, &id, DocStatus::Draft, &Record::new().with("mode", "strict"))
            .await
            .unwrap();

        let first = cache.get_or_load(&store, &entity_type, &id).await.unwrap().unwrap();
        assert_eq!(first.fields.get("mode").and_then(|v| v.as_text()), Some("strict"));

        // Mutate the store behind the cache; cached copy still served
        store
            .set(&entity_type, &id, DocStatus::Draft, &Record::new().with("mode", "lax"))
            .await
            .unwrap();
        let second = cache.get_or_load(&store, &entity_type, &id).await.unwrap().unwrap();
        assert_eq!(second.fields.get("mode").and_then(|v| v.as_text()), Some("strict"));
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let store = MemoryStore::new();
        let cache = RecordCache::new(100, Duration::from_secs(60));
        let entity_type = EntityType::new("settings");
        let id = EntityId::new();

        store
            .set(&entity_type, &id, DocStatus::Draft, &Record::new().with("mode", "strict"))
            .await
            .unwrap();
        cache.get_or_load(&store, &entity_type, &id).await.unwrap();

        store
            .set(&entity_type, &id, DocStatus::Draft, &Record::new().with("mode", "lax"))
            .await
            .unwrap();
        cache.invalidate(&entity_type, &id).await;

        let reloaded = cache.get_or_load(&store, &entity_type, &id).await.unwrap().unwrap();
        assert_eq!(reloaded.fields.get("mode").and_then(|v| v.as_text()), Some("lax"));
    }

    #[tokio::test]
    async fn absent_record_is_not_cached() {
        let store = MemoryStore::new();
        let cache = RecordCache::new(100, Duration::from_secs(60));
        let entity_type = EntityType::new("settings");
        let id = EntityId::new();

        assert!(cache.get_or_load(&store, &entity_type, &id).await.unwrap().is_none());

        store
            .set(&entity_type, &id, DocStatus::Draft, &Record::new().with("mode", "strict"))
            .await
            .unwrap();
        assert!(cache.get_or_load(&store, &entity_type, &id).await.unwrap().is_some());
    }
}
