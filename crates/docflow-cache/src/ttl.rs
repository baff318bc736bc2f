//! TTL key/value cache
//!
//! Concurrent cache built on moka with a per-entry expiry deadline. Moka
//! handles capacity eviction and concurrency; the expiry contract (a read at
//! or past the deadline is a miss, never a stale value) is enforced at read
//! time against the entry's own deadline, so it holds regardless of when the
//! underlying cache gets around to evicting.

use moka::future::Cache;
use std::time::Duration;
use tokio::time::Instant;

/// A cached value with its expiry deadline
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries currently held (including not-yet-evicted expired ones)
    pub entry_count: u64,
}

/// Key/value cache with per-entry TTL
///
/// Values are cloned out on read, so `V` should be cheap to clone (or an
/// `Arc`).
#[derive(Debug, Clone)]
pub struct TtlCache<V: Clone + Send + Sync + 'static> {
    inner: Cache<String, Entry<V>>,
    default_ttl: Duration,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Create a cache with max capacity and a default TTL
    #[must_use]
    pub fn new(max_capacity: u64, default_ttl: Duration) -> Self {
        Self {
            inner: Cache::new(max_capacity),
            default_ttl,
        }
    }

    /// Insert a value with the cache's default TTL
    pub async fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    /// Insert a value with an explicit TTL
    pub async fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.inner.insert(key.into(), entry).await;
    }

    /// Fetch a value; expired entries are misses
    pub async fn get(&self, key: &str) -> Option<V> {
        let entry = self.inner.get(key).await?;
        if Instant::now() >= entry.expires_at {
            // Expired but not yet evicted: drop it and report a miss
            self.inner.invalidate(key).await;
            return None;
        }
        Some(entry.value)
    }

    /// Remove an entry explicitly
    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Remove all entries
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Whether a live (unexpired) entry exists for the key
    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Get cache statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}
