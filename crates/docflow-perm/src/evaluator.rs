//! Layered permission evaluation
//!
//! Three layers, all must pass, short-circuiting on the first denial:
//! 1. Role layer: static role requirement for the operation
//! 2. Document layer: instance-specific checks
//! 3. Custom predicates: business rules over instance fields, last
//!
//! The evaluator is stateless after construction and safe to share across
//! concurrent requests without locking.

use crate::actor::{Actor, Operation};
use crate::error::PermissionDenied;
use crate::rules::{DocumentCheck, FieldPredicate, PermissionRule};
use docflow_store::{EntityType, Record};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Policy {
    any_of_roles: Vec<String>,
    document_checks: Vec<Arc<dyn DocumentCheck>>,
    predicates: Vec<Arc<dyn FieldPredicate>>,
}

/// Builder for [`PermissionEvaluator`]
#[derive(Default)]
pub struct EvaluatorBuilder {
    policies: HashMap<(EntityType, Operation), Policy>,
}

impl EvaluatorBuilder {
    /// Add a rule; rules for the same (type, operation) pair merge
    #[must_use]
    pub fn rule(mut self, rule: PermissionRule) -> Self {
        let policy = self
            .policies
            .entry((rule.entity_type, rule.operation))
            .or_default();
        policy.any_of_roles.extend(rule.any_of_roles);
        policy.document_checks.extend(rule.document_checks);
        policy.predicates.extend(rule.predicates);
        self
    }

    /// Freeze into an evaluator
    #[must_use]
    pub fn build(self) -> PermissionEvaluator {
        PermissionEvaluator {
            policies: self.policies,
        }
    }
}

/// Stateless, layered authorization
///
/// Deny-by-default: an (entity type, operation) pair with no registered rule
/// is refused outright.
pub struct PermissionEvaluator {
    policies: HashMap<(EntityType, Operation), Policy>,
}

impl PermissionEvaluator {
    /// Start building an evaluator
    #[inline]
    #[must_use]
    pub fn builder() -> EvaluatorBuilder {
        EvaluatorBuilder::default()
    }

    /// Authorize `operation` on `entity_type` for `actor`
    ///
    /// Document-layer checks and predicates run only when `instance` is
    /// provided; callers gating a bulk read apply the role layer first and
    /// re-authorize each row with its instance.
    ///
    /// # Errors
    /// Returns [`PermissionDenied`] with a human-readable, non-leaking reason
    /// from the first layer that refuses.
    pub fn authorize(
        &self,
        actor: &Actor,
        entity_type: &EntityType,
        operation: Operation,
        instance: Option<&Record>,
    ) -> Result<(), PermissionDenied> {
        let deny = |reason: String| {
            tracing::debug!(
                user = %actor.user,
                entity_type = %entity_type,
                %operation,
                %reason,
                "permission denied"
            );
            Err(PermissionDenied {
                entity_type: entity_type.clone(),
                operation,
                reason,
            })
        };

        let Some(policy) = self.policies.get(&(entity_type.clone(), operation)) else {
            return deny(format!("{operation} is not permitted on {entity_type}"));
        };

        // Layer 1: roles
        if !policy.any_of_roles.is_empty()
            && !actor.has_any_role(policy.any_of_roles.iter().map(String::as_str))
        {
            return deny(format!(
                "you do not have a role permitting {operation} on {entity_type}"
            ));
        }

        // Layer 2: document checks (need the concrete instance)
        if let Some(record) = instance {
            for check in &policy.document_checks {
                if let Err(reason) = check.check(actor, record) {
                    return deny(reason);
                }
            }

            // Layer 3: custom predicates, always last
            for predicate in &policy.predicates {
                if let Err(reason) = predicate.check(record) {
                    return deny(reason);
                }
            }
        }

        Ok(())
    }

    /// Whether any rule exists for the pair
    #[inline]
    #[must_use]
    pub fn has_policy(&self, entity_type: &EntityType, operation: Operation) -> bool {
        self.policies.contains_key(&(entity_type.clone(), operation))
    }
}
