//! Docflow Perm - Layered authorization for the lifecycle runtime
//!
//! Evaluation order, short-circuiting on the first denial:
//! 1. Role layer (static requirement per operation)
//! 2. Document layer (instance checks: ownership, restricted field values)
//! 3. Custom predicates (business rules over fields, always last)
//!
//! The evaluator is stateless and shared freely across concurrent requests.

#![warn(unreachable_pub)]

pub mod actor;
pub mod error;
pub mod evaluator;
pub mod rules;

pub use actor::{Actor, Operation, ADMINISTRATOR};
pub use error::PermissionDenied;
pub use evaluator::{EvaluatorBuilder, PermissionEvaluator};
pub use rules::{
    DocumentCheck, FieldPredicate, FnPredicate, OwnerOnly, PermissionRule, RestrictedFieldValues,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
