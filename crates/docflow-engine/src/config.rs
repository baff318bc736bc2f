//! Engine configuration

use std::time::Duration;

/// Tunables for the lifecycle engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Autoname collision retry budget (total attempts)
    pub autoname_max_attempts: u32,
    /// Capacity of the record cache
    pub record_cache_capacity: u64,
    /// Backstop TTL of the record cache; engine writes invalidate eagerly
    pub record_cache_ttl: Duration,
}

impl EngineConfig {
    /// Create the default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With autoname retry budget
    #[inline]
    #[must_use]
    pub fn with_autoname_max_attempts(mut self, attempts: u32) -> Self {
        self.autoname_max_attempts = attempts.max(1);
        self
    }

    /// With record cache capacity
    #[inline]
    #[must_use]
    pub fn with_record_cache_capacity(mut self, capacity: u64) -> Self {
        self.record_cache_capacity = capacity;
        self
    }

    /// With record cache backstop TTL
    #[inline]
    #[must_use]
    pub fn with_record_cache_ttl(mut self, ttl: Duration) -> Self {
        self.record_cache_ttl = ttl;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            autoname_max_attempts: 3,
            record_cache_capacity: 1024,
            record_cache_ttl: Duration::from_secs(300),
        }
    }
}
