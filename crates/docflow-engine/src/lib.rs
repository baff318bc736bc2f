//! Document lifecycle engine
//!
//! Ties the workspace together: documents move through their state machine
//! here, with hooks from `docflow-hooks` running at each stage, permissions
//! from `docflow-perm` gating every operation, reads served through
//! `docflow-cache`, and slow work handed to `docflow-jobs`.
//!
//! - [`LifecycleEngine`]: insert / save / submit / cancel / load / list
//! - [`Api`]: whitelisted method surface with structured responses
//! - [`EngineError`]: the failure taxonomy callers see

mod api;
mod base;
mod config;
mod engine;
mod error;

pub use api::{Api, ApiBuilder, ApiError, ApiErrorKind, ApiMethod, ApiResponse};
pub use base::AutonameBase;
pub use config::EngineConfig;
pub use engine::{EngineBuilder, LifecycleEngine};
pub use error::EngineError;
