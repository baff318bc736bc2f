//! Permission errors

use crate::actor::Operation;
use docflow_store::EntityType;

/// Authorization refused
///
/// The reason is human-readable and intentionally non-leaking: it names the
/// operation and what is missing, never the rule internals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} on {entity_type} denied: {reason}")]
pub struct PermissionDenied {
    /// Entity type the operation targeted
    pub entity_type: EntityType,
    /// Operation that was refused
    pub operation: Operation,
    /// Human-readable reason
    pub reason: String,
}
