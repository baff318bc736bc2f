//! Records, entity identity, and document lifecycle status

use crate::value::FieldValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Name of an entity type (e.g. `"sales_order"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityType(String);

impl EntityType {
    /// Create a new entity type name
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The type name as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Unique identifier of an entity instance
///
/// ULID-backed: sortable by creation time and collision-resistant, which the
/// autoname stage relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(Ulid);

impl EntityId {
    /// Generate a fresh identifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_str(s)?))
    }
}

/// Ordered map of field name to value
///
/// Field order is preserved so persisted output is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    /// Create an empty record
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a field value
    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Set a field value, returning the previous value if any
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.fields.insert(field.into(), value.into())
    }

    /// Builder-style field assignment
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Remove a field
    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.shift_remove(field)
    }

    /// Whether the record has the given field
    #[inline]
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Number of fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over (field, value) pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy a subset of fields into a new record
    ///
    /// Unknown field names are skipped, matching the store contract where a
    /// field projection never fails.
    #[must_use]
    pub fn project(&self, fields: &[String]) -> Self {
        let mut out = Self::new();
        for name in fields {
            if let Some(value) = self.fields.get(name) {
                out.fields.insert(name.clone(), value.clone());
            }
        }
        out
    }

    /// Overwrite this record's fields with those of `other`
    pub fn merge(&mut self, other: &Record) {
        for (k, v) in other.iter() {
            self.fields.insert(k.to_string(), v.clone());
        }
    }
}

/// Lifecycle status of a document
///
/// Transitions only move forward: `New → Draft`, `Draft → Submitted`,
/// `Draft → Cancelled`, `Submitted → Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocStatus {
    /// In memory only, never persisted
    New,
    /// Persisted, editable
    Draft,
    /// Finalized, immutable except for cancellation
    Submitted,
    /// Terminal
    Cancelled,
}

impl DocStatus {
    /// Statuses reachable from this one
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [DocStatus] {
        match self {
            Self::New => &[Self::Draft],
            Self::Draft => &[Self::Submitted, Self::Cancelled],
            Self::Submitted => &[Self::Cancelled],
            Self::Cancelled => &[],
        }
    }

    /// Whether `self → to` is a legal transition
    #[inline]
    #[must_use]
    pub fn can_transition(self, to: DocStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A business document: identity, status, and fields
///
/// The lifecycle engine owns a `Document` for the duration of a transition;
/// persisted ownership belongs to the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Entity type of this document
    pub entity_type: EntityType,
    /// Identifier, assigned by the autoname stage on insert
    pub id: Option<EntityId>,
    /// Current lifecycle status
    pub status: DocStatus,
    /// Field values
    pub fields: Record,
}

impl Document {
    /// Create a new, unpersisted document
    #[must_use]
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: None,
            status: DocStatus::New,
            fields: Record::new(),
        }
    }

    /// Builder-style field assignment
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.set(field, value);
        self
    }
}
