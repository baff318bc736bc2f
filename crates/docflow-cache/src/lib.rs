//! Docflow Cache - TTL caching for the lifecycle runtime
//!
//! Two layers:
//! - [`TtlCache`]: general key/value cache with per-entry expiry; a read at
//!   or past the deadline is always a miss
//! - [`RecordCache`]: record-backed convenience the engine invalidates on
//!   every write it persists

#![warn(unreachable_pub)]

pub mod record_cache;
pub mod ttl;

pub use record_cache::RecordCache;
pub use ttl::{CacheStats, TtlCache};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
