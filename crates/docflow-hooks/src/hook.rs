//! Hook traits and execution context

use crate::stage::Stage;
use async_trait::async_trait;
use docflow_store::{DocStatus, EntityId, EntityType, Record};

/// Failure raised by a hook
#[derive(Debug, Clone, thiserror::Error)]
pub enum HookError {
    /// Domain validation failure, user-facing, aborts the transition
    #[error("validation failed: {0}")]
    Validation(String),

    /// Cleanup/reversal failure during cancellation; fatal consistency fault
    #[error("consistency fault: {0}")]
    Consistency(String),

    /// Any other hook failure
    #[error("hook failed: {0}")]
    Failed(String),
}

/// State a hook observes and (pre-persist) mutates
///
/// The engine hands hooks a working copy of the document; nothing is
/// persisted until every hook of the transition has passed. At post-persist
/// stages the context mirrors the stored document and field changes are
/// discarded.
#[derive(Debug, Clone)]
pub struct HookContext {
    entity_type: EntityType,
    stage: Stage,
    id: Option<EntityId>,
    status: DocStatus,
    actor_user: String,
    fields: Record,
}

impl HookContext {
    /// Create a context for one stage invocation
    #[must_use]
    pub fn new(
        entity_type: EntityType,
        stage: Stage,
        id: Option<EntityId>,
        status: DocStatus,
        actor_user: impl Into<String>,
        fields: Record,
    ) -> Self {
        Self {
            entity_type,
            stage,
            id,
            status,
            actor_user: actor_user.into(),
            fields,
        }
    }

    /// Entity type of the document
    #[inline]
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Stage currently running
    #[inline]
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Identifier, absent until the autoname stage assigns one
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Assign the identifier (autoname stage)
    pub fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    /// Discard the identifier so the autoname stage can retry after a
    /// collision
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    /// Lifecycle status at the start of the transition
    #[inline]
    #[must_use]
    pub fn status(&self) -> DocStatus {
        self.status
    }

    /// User driving the transition
    #[inline]
    #[must_use]
    pub fn actor_user(&self) -> &str {
        &self.actor_user
    }

    /// Working copy of the fields
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &Record {
        &self.fields
    }

    /// Mutable working copy of the fields
    #[inline]
    pub fn fields_mut(&mut self) -> &mut Record {
        &mut self.fields
    }

    /// Consume the context, yielding the (possibly mutated) fields
    #[must_use]
    pub fn into_fields(self) -> Record {
        self.fields
    }

    /// Move the context to the next stage of the transition
    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// Update the status the context reports (engine use)
    pub fn set_status(&mut self, status: DocStatus) {
        self.status = status;
    }
}

/// An event hook bound to a (type, stage) pair
///
/// Event hooks for a stage all run, in registration order, failing fast on
/// the first error.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Run the hook against the working context
    async fn run(&self, ctx: &mut HookContext) -> Result<(), HookError>;
}

/// Event hook built from a plain (synchronous) function
///
/// Most validation hooks are pure field checks; this saves a trait impl.
pub struct FnHook {
    name: String,
    f: Box<dyn Fn(&mut HookContext) -> Result<(), HookError> + Send + Sync>,
}

impl FnHook {
    /// Wrap a function as a hook
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&mut HookContext) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            name: name.into(),
            f: Box::new(f),
        })
    }
}

#[async_trait]
impl Hook for FnHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut HookContext) -> Result<(), HookError> {
        (self.f)(ctx)
    }
}

/// The engine's built-in behavior for a stage
///
/// Handed to a [`StageOverride`] so the override can invoke it.
#[async_trait]
pub trait BaseStage: Send + Sync {
    /// Run the default behavior
    async fn call(&self, ctx: &mut HookContext) -> Result<(), HookError>;
}

/// No-op base for stages without built-in behavior
pub struct NoopBase;

#[async_trait]
impl BaseStage for NoopBase {
    async fn call(&self, _ctx: &mut HookContext) -> Result<(), HookError> {
        Ok(())
    }
}

/// Controller override: a single specialized implementation of a stage
///
/// The override receives the base behavior and is contractually required to
/// invoke it, before or after its own logic. Base-first is the conventional
/// pattern; the registry allows either order and does not enforce the call
/// (that is validated by review policy, not by the engine).
///
/// When both an override and event hooks are registered for a stage, the
/// override (including its base call) runs first, then the event hooks in
/// order. This order is fixed and tested.
#[async_trait]
pub trait StageOverride: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Run the override; `base` is the engine's default behavior
    async fn run(&self, ctx: &mut HookContext, base: &dyn BaseStage) -> Result<(), HookError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context() -> HookContext {
        HookContext::new(
            EntityType::new("sales_order"),
            Stage::Validate,
            None,
            DocStatus::New,
            "alice",
            Record::new().with("total", 100i64),
        )
    }

    #[tokio::test]
    async fn fn_hook_runs() {
        let hook = FnHook::new("bump", |ctx| {
            ctx.fields_mut().set("total", 200i64);
            Ok(())
        });
        let mut ctx = context();
        hook.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.fields().get("total").and_then(|v| v.as_int()), Some(200));
    }

    #[tokio::test]
    async fn fn_hook_validation_error() {
        let hook = FnHook::new("reject", |_| {
            Err(HookError::Validation("total is required".to_string()))
        });
        let mut ctx = context();
        let err = hook.run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, HookError::Validation(_)));
    }

    #[tokio::test]
    async fn noop_base_passes() {
        let mut ctx = context();
        assert!(NoopBase.call(&mut ctx).await.is_ok());
    }
}
