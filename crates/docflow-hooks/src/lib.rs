//! Docflow Hooks - Extension points for the lifecycle runtime
//!
//! - [`Stage`]: the named points a document passes through
//! - [`Hook`]: event callbacks, all run in order, fail-fast
//! - [`StageOverride`]: controller polymorphism, one specialized
//!   implementation per stage that wraps the base behavior
//! - [`HookRegistry`]: built once at process init, read-only afterwards

#![warn(unreachable_pub)]

pub mod hook;
pub mod registry;
pub mod stage;

pub use hook::{BaseStage, FnHook, Hook, HookContext, HookError, NoopBase, StageOverride};
pub use registry::{HookRegistry, RegistryBuilder, RegistryError, ResolvedStage};
pub use stage::Stage;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
