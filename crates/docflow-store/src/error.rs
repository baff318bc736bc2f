//! Store boundary errors

use crate::record::{EntityId, EntityType};

/// Errors raised at the record store boundary
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Requested instance does not exist
    #[error("{entity_type} {id} not found")]
    NotFound {
        /// Entity type queried
        entity_type: EntityType,
        /// Identifier queried
        id: EntityId,
    },

    /// Backend rejected the operation
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Construct a `NotFound` error
    #[inline]
    #[must_use]
    pub fn not_found(entity_type: &EntityType, id: &EntityId) -> Self {
        Self::NotFound {
            entity_type: entity_type.clone(),
            id: *id,
        }
    }
}
