//! Structured, bound-parameter filters
//!
//! A [`Filter`] pairs a field name with an operator carrying typed values.
//! This is the only way to express a query condition: values travel as
//! [`FieldValue`] bindings and are never interpolated into a query string,
//! which closes off injection at the type level.

use crate::record::Record;
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Comparison operator with its bound operand(s)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterOp {
    /// Field equals value
    Eq(FieldValue),
    /// Field does not equal value
    Ne(FieldValue),
    /// Field greater than value
    Gt(FieldValue),
    /// Field greater than or equal to value
    Gte(FieldValue),
    /// Field less than value
    Lt(FieldValue),
    /// Field less than or equal to value
    Lte(FieldValue),
    /// Field equals one of the values
    In(Vec<FieldValue>),
}

/// A single filter condition on a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Field name the condition applies to
    pub field: String,
    /// Operator and bound operand(s)
    pub op: FilterOp,
}

impl Filter {
    /// `field == value`
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq(value.into()),
        }
    }

    /// `field != value`
    #[must_use]
    pub fn ne(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Ne(value.into()),
        }
    }

    /// `field > value`
    #[must_use]
    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gt(value.into()),
        }
    }

    /// `field >= value`
    #[must_use]
    pub fn gte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gte(value.into()),
        }
    }

    /// `field < value`
    #[must_use]
    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lt(value.into()),
        }
    }

    /// `field <= value`
    #[must_use]
    pub fn lte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lte(value.into()),
        }
    }

    /// `field in (values...)`
    #[must_use]
    pub fn is_in(field: impl Into<String>, values: Vec<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::In(values),
        }
    }

    /// Whether the record satisfies this condition
    ///
    /// A missing field or a type-mismatched comparison is a non-match,
    /// never an error.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };

        match &self.op {
            FilterOp::Eq(expected) => actual == expected,
            FilterOp::Ne(expected) => actual != expected,
            FilterOp::Gt(expected) => actual.compare(expected) == Some(Ordering::Greater),
            FilterOp::Gte(expected) => {
                matches!(actual.compare(expected), Some(Ordering::Greater | Ordering::Equal))
            }
            FilterOp::Lt(expected) => actual.compare(expected) == Some(Ordering::Less),
            FilterOp::Lte(expected) => {
                matches!(actual.compare(expected), Some(Ordering::Less | Ordering::Equal))
            }
            FilterOp::In(values) => values.iter().any(|v| v == actual),
        }
    }
}

/// Whether the record satisfies every filter (conjunction)
#[must_use]
pub fn matches_all(filters: &[Filter], record: &Record) -> bool {
    filters.iter().all(|f| f.matches(record))
}
