//! Permission rules and document-layer checks

use crate::actor::{Actor, Operation};
use docflow_store::{EntityType, FieldValue, Record};
use std::collections::HashMap;
use std::sync::Arc;

/// Instance-specific authorization check (second layer)
///
/// Runs only when a concrete instance is available; inspects the actor and
/// the instance together (ownership, linked-record state, restricted field
/// values). Returns a human-readable denial reason on failure.
pub trait DocumentCheck: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Allow or deny with a reason
    fn check(&self, actor: &Actor, record: &Record) -> Result<(), String>;
}

/// Caller-supplied business rule (third layer)
///
/// Evaluated last, after the instance is loaded, so it can inspect fields.
pub trait FieldPredicate: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Allow or deny with a reason
    fn check(&self, record: &Record) -> Result<(), String>;
}

/// Predicate built from a plain function
pub struct FnPredicate {
    name: String,
    f: Box<dyn Fn(&Record) -> Result<(), String> + Send + Sync>,
}

impl FnPredicate {
    /// Wrap a function as a predicate
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&Record) -> Result<(), String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            f: Box::new(f),
        })
    }
}

impl FieldPredicate for FnPredicate {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, record: &Record) -> Result<(), String> {
        (self.f)(record)
    }
}

/// Document check denying writes on per-user restricted field values
///
/// A user listed against a value of `field` is refused when the instance
/// carries that value (e.g. a branch the user may not write to). The
/// administrator account bypasses the restriction.
pub struct RestrictedFieldValues {
    field: String,
    restricted: HashMap<String, Vec<FieldValue>>,
}

impl RestrictedFieldValues {
    /// Create a restriction set over the given field
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            restricted: HashMap::new(),
        }
    }

    /// Restrict `user` from instances whose field equals `value`
    #[must_use]
    pub fn restrict(mut self, user: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.restricted
            .entry(user.into())
            .or_default()
            .push(value.into());
        self
    }
}

impl DocumentCheck for RestrictedFieldValues {
    fn name(&self) -> &str {
        "restricted_field_values"
    }

    fn check(&self, actor: &Actor, record: &Record) -> Result<(), String> {
        if actor.is_administrator() {
            return Ok(());
        }
        let Some(value) = record.get(&self.field) else {
            return Ok(());
        };
        if let Some(values) = self.restricted.get(&actor.user) {
            if values.contains(value) {
                return Err(format!("access to {} '{value}' is restricted", self.field));
            }
        }
        Ok(())
    }
}

/// Document check requiring the actor to own the instance
///
/// Ownership is read from a field holding the owner's user id.
pub struct OwnerOnly {
    owner_field: String,
}

impl OwnerOnly {
    /// Create an ownership check reading the given field
    #[must_use]
    pub fn new(owner_field: impl Into<String>) -> Self {
        Self {
            owner_field: owner_field.into(),
        }
    }
}

impl DocumentCheck for OwnerOnly {
    fn name(&self) -> &str {
        "owner_only"
    }

    fn check(&self, actor: &Actor, record: &Record) -> Result<(), String> {
        if actor.is_administrator() {
            return Ok(());
        }
        match record.get(&self.owner_field).and_then(|v| v.as_text()) {
            Some(owner) if owner == actor.user => Ok(()),
            _ => Err("you are not the owner of this record".to_string()),
        }
    }
}

/// Declarative rule: who may perform an operation on an entity type
///
/// One rule per (entity type, operation); registering another rule for the
/// same pair merges role requirements and appends checks.
pub struct PermissionRule {
    /// Entity type the rule governs
    pub entity_type: EntityType,
    /// Operation the rule governs
    pub operation: Operation,
    /// Actor must hold at least one of these (empty = any authenticated actor)
    pub any_of_roles: Vec<String>,
    /// Document-layer checks, all must pass
    pub document_checks: Vec<Arc<dyn DocumentCheck>>,
    /// Custom predicates, all must pass, evaluated last
    pub predicates: Vec<Arc<dyn FieldPredicate>>,
}

impl PermissionRule {
    /// Create a rule for an (entity type, operation) pair
    #[must_use]
    pub fn new(entity_type: impl Into<EntityType>, operation: Operation) -> Self {
        Self {
            entity_type: entity_type.into(),
            operation,
            any_of_roles: Vec::new(),
            document_checks: Vec::new(),
            predicates: Vec::new(),
        }
    }

    /// Require at least one of the given roles
    #[must_use]
    pub fn require_any_role<S: Into<String>>(mut self, roles: impl IntoIterator<Item = S>) -> Self {
        self.any_of_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Add a document-layer check
    #[must_use]
    pub fn with_document_check(mut self, check: Arc<dyn DocumentCheck>) -> Self {
        self.document_checks.push(check);
        self
    }

    /// Add a custom predicate
    #[must_use]
    pub fn with_predicate(mut self, predicate: Arc<dyn FieldPredicate>) -> Self {
        self.predicates.push(predicate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_field_denies_listed_user() {
        let check = RestrictedFieldValues::new("branch").restrict("bob", "downtown");
        let record = Record::new().with("branch", "downtown");

        let denied = check.check(&Actor::new("bob"), &record);
        assert!(denied.is_err());

        let allowed = check.check(&Actor::new("alice"), &record);
        assert!(allowed.is_ok());
    }

    #[test]
    fn restricted_field_administrator_bypass() {
        let check = RestrictedFieldValues::new("branch").restrict("Administrator", "downtown");
        let record = Record::new().with("branch", "downtown");
        assert!(check.check(&Actor::new("Administrator"), &record).is_ok());
    }

    #[test]
    fn restricted_field_absent_field_allows() {
        let check = RestrictedFieldValues::new("branch").restrict("bob", "downtown");
        assert!(check.check(&Actor::new("bob"), &Record::new()).is_ok());
    }

    #[test]
    fn owner_only_check() {
        let check = OwnerOnly::new("owner");
        let record = Record::new().with("owner", "alice");

        assert!(check.check(&Actor::new("alice"), &record).is_ok());
        assert!(check.check(&Actor::new("bob"), &record).is_err());
        assert!(check.check(&Actor::new("Administrator"), &record).is_ok());
    }

    #[test]
    fn fn_predicate() {
        let predicate = FnPredicate::new("total_bound", |record| {
            match record.get("total").and_then(|v| v.as_int()) {
                Some(total) if total <= 1000 => Ok(()),
                _ => Err("total exceeds the approval limit".to_string()),
            }
        });

        assert!(predicate.check(&Record::new().with("total", 500i64)).is_ok());
        assert!(predicate.check(&Record::new().with("total", 5000i64)).is_err());
    }
}
