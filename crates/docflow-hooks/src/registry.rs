//! Init-once hook registry
//!
//! Registration happens once during process initialization through
//! [`RegistryBuilder`]; [`HookRegistry`] is immutable afterwards, so
//! resolution is a plain map read and safe under any number of concurrent
//! lifecycle transitions.

use crate::hook::{Hook, StageOverride};
use crate::stage::Stage;
use docflow_store::EntityType;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Registration errors, raised at init time only
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// A stage already has a controller override
    #[error("duplicate override for {entity_type}.{stage}")]
    DuplicateOverride {
        /// Entity type of the clashing registration
        entity_type: EntityType,
        /// Stage of the clashing registration
        stage: Stage,
    },

    /// The process-wide registry was installed twice
    #[error("global hook registry already installed")]
    AlreadyInstalled,
}

/// Hooks resolved for one (type, stage) pair
#[derive(Default)]
pub struct ResolvedStage {
    override_hook: Option<Arc<dyn StageOverride>>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl ResolvedStage {
    /// The controller override, if one is registered
    #[inline]
    #[must_use]
    pub fn override_hook(&self) -> Option<&Arc<dyn StageOverride>> {
        self.override_hook.as_ref()
    }

    /// Event hooks in execution order
    #[inline]
    #[must_use]
    pub fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.hooks
    }

    /// Whether nothing is registered for the pair
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.override_hook.is_none() && self.hooks.is_empty()
    }
}

#[derive(Default)]
struct StageEntries {
    override_hook: Option<Arc<dyn StageOverride>>,
    // (order, registration sequence, hook)
    hooks: Vec<(i32, usize, Arc<dyn Hook>)>,
}

/// Builder collecting registrations before the registry freezes
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<(EntityType, Stage), StageEntries>,
    sequence: usize,
}

impl RegistryBuilder {
    /// Create an empty builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event hook at the given order
    ///
    /// Hooks for a stage execute sorted by (order, registration sequence).
    pub fn register(
        &mut self,
        entity_type: impl Into<EntityType>,
        stage: Stage,
        hook: Arc<dyn Hook>,
        order: i32,
    ) -> &mut Self {
        let seq = self.sequence;
        self.sequence += 1;
        self.entries
            .entry((entity_type.into(), stage))
            .or_default()
            .hooks
            .push((order, seq, hook));
        self
    }

    /// Register the controller override for a stage
    ///
    /// # Errors
    /// At most one override per (type, stage); a second registration is an
    /// init error.
    pub fn override_stage(
        &mut self,
        entity_type: impl Into<EntityType>,
        stage: Stage,
        controller: Arc<dyn StageOverride>,
    ) -> Result<&mut Self, RegistryError> {
        let entity_type = entity_type.into();
        let entry = self.entries.entry((entity_type.clone(), stage)).or_default();
        if entry.override_hook.is_some() {
            return Err(RegistryError::DuplicateOverride { entity_type, stage });
        }
        entry.override_hook = Some(controller);
        Ok(self)
    }

    /// Freeze into an immutable registry
    #[must_use]
    pub fn build(self) -> HookRegistry {
        let map = self
            .entries
            .into_iter()
            .map(|(key, mut entry)| {
                entry.hooks.sort_by_key(|(order, seq, _)| (*order, *seq));
                let resolved = ResolvedStage {
                    override_hook: entry.override_hook,
                    hooks: entry.hooks.into_iter().map(|(_, _, h)| h).collect(),
                };
                (key, resolved)
            })
            .collect();
        HookRegistry { map }
    }
}

/// Immutable map of (entity type, stage) to ordered hooks
pub struct HookRegistry {
    map: HashMap<(EntityType, Stage), ResolvedStage>,
}

static GLOBAL: OnceCell<Arc<HookRegistry>> = OnceCell::new();

impl HookRegistry {
    /// Registry with nothing registered
    #[must_use]
    pub fn empty() -> Self {
        RegistryBuilder::new().build()
    }

    /// Resolve hooks for a (type, stage) pair
    ///
    /// `None` when nothing is registered; no hook ever runs for a stage it
    /// was not registered for.
    #[must_use]
    pub fn resolve(&self, entity_type: &EntityType, stage: Stage) -> Option<&ResolvedStage> {
        self.map.get(&(entity_type.clone(), stage))
    }

    /// Number of (type, stage) pairs with registrations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the registry has no registrations
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Install the process-wide registry (init barrier, at most once)
    ///
    /// # Errors
    /// Returns [`RegistryError::AlreadyInstalled`] on a second install.
    pub fn install_global(registry: Arc<HookRegistry>) -> Result<(), RegistryError> {
        GLOBAL
            .set(registry)
            .map_err(|_| RegistryError::AlreadyInstalled)
    }

    /// The process-wide registry, if installed
    #[must_use]
    pub fn global() -> Option<Arc<HookRegistry>> {
        GLOBAL.get().cloned()
    }
}
