//! Docflow Store - Data model and record store boundary
//!
//! Foundation crate for the document lifecycle runtime:
//! - Typed field values and ordered records
//! - Entity identity (type names, ULID identifiers)
//! - Document lifecycle status with forward-only transitions
//! - Structured, bound-parameter filters (no query strings, ever)
//! - The [`RecordStore`] trait plus an in-memory implementation

#![warn(unreachable_pub)]

pub mod error;
pub mod filter;
pub mod record;
pub mod store;
pub mod value;

pub use error::StoreError;
pub use filter::{matches_all, Filter, FilterOp};
pub use record::{DocStatus, Document, EntityId, EntityType, Record};
pub use store::{MemoryStore, RecordStore, StoredRecord};
pub use value::FieldValue;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
