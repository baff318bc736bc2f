//! Built-in base behaviors for lifecycle stages
//!
//! A [`StageOverride`] receives one of these and is expected to invoke it;
//! stages without an override run the base directly.
//!
//! [`StageOverride`]: docflow_hooks::StageOverride

use async_trait::async_trait;
use docflow_hooks::{BaseStage, HookContext, HookError};
use docflow_store::EntityId;

/// Default autoname: assign a fresh ULID-derived identifier
///
/// Leaves an identifier already set by an override untouched, so custom
/// naming schemes compose with the collision retry loop in the engine.
pub struct AutonameBase;

#[async_trait]
impl BaseStage for AutonameBase {
    async fn call(&self, ctx: &mut HookContext) -> Result<(), HookError> {
        if ctx.id().is_none() {
            ctx.set_id(EntityId::new());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_hooks::Stage;
    use docflow_store::{DocStatus, EntityType, Record};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn autoname_assigns_when_absent() {
        let mut ctx = HookContext::new(
            EntityType::new("order"),
            Stage::Autoname,
            None,
            DocStatus::New,
            "alice",
            Record::new(),
        );
        AutonameBase.call(&mut ctx).await.unwrap();
        assert!(ctx.id().is_some());
    }

    #[tokio::test]
    async fn autoname_preserves_existing_id() {
        let id = EntityId::new();
        let mut ctx = HookContext::new(
            EntityType::new("order"),
            Stage::Autoname,
            Some(id),
            DocStatus::New,
            "alice",
            Record::new(),
        );
        AutonameBase.call(&mut ctx).await.unwrap();
        assert_eq!(ctx.id(), Some(id));
    }
}
