//! Engine error taxonomy
//!
//! Synchronous failures (validation, permission, not-found) surface directly
//! to the caller with a human-readable message. Consistency faults are
//! logged and escalated, never swallowed. Job failures are asynchronous and
//! reported through the ticket, not through these errors.

use docflow_hooks::{HookError, Stage};
use docflow_jobs::JobError;
use docflow_perm::PermissionDenied;
use docflow_store::{DocStatus, Document, EntityId, EntityType, StoreError};

/// Failures raised by the lifecycle engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A hook rejected the document; user-facing, nothing was persisted
    #[error("validation failed: {0}")]
    Validation(String),

    /// Authorization refused before any side effect
    #[error(transparent)]
    Permission(#[from] PermissionDenied),

    /// Requested instance does not exist
    #[error("{entity_type} {id} not found")]
    NotFound {
        /// Entity type requested
        entity_type: EntityType,
        /// Identifier requested
        id: EntityId,
    },

    /// Status may only move forward
    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition {
        /// Current status
        from: DocStatus,
        /// Requested status
        to: DocStatus,
    },

    /// A hook attempted a transition on the instance it is already
    /// transitioning
    #[error("re-entrant transition on {entity_type} {id}")]
    ReentrantTransition {
        /// Entity type of the instance
        entity_type: EntityType,
        /// Identifier of the instance
        id: EntityId,
    },

    /// Autoname could not find a free identifier within its retry budget
    #[error("could not assign a unique name after {attempts} attempts")]
    NamingExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// A cancellation cleanup hook failed to complete; fatal, requires
    /// operator attention, never retried automatically
    #[error("consistency fault in '{hook}' at {stage}: {reason}")]
    Consistency {
        /// Stage where the fault occurred
        stage: Stage,
        /// Hook that failed
        hook: String,
        /// What went wrong
        reason: String,
    },

    /// A non-validation hook failure outside cancellation
    #[error("hook '{hook}' failed at {stage}: {reason}")]
    HookFailed {
        /// Stage where the hook ran
        stage: Stage,
        /// Hook that failed
        hook: String,
        /// What went wrong
        reason: String,
    },

    /// A notification hook failed after the transition was persisted
    ///
    /// The transition stands; the document here is the persisted state,
    /// including any identifier assigned during the transition.
    #[error("hook '{hook}' failed at {stage} after persist: {reason}")]
    PostPersist {
        /// Stage where the hook ran
        stage: Stage,
        /// Hook that failed
        hook: String,
        /// What went wrong
        reason: String,
        /// The document as persisted
        document: Document,
    },

    /// Record store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Job submission failure
    #[error(transparent)]
    Job(#[from] JobError),

    /// Deferred work was requested but no job queue is configured
    #[error("background job queue is not configured")]
    JobsUnavailable,
}

impl EngineError {
    /// Map a hook failure into the engine taxonomy
    ///
    /// Any failure during `on_cancel` is a consistency fault, regardless of
    /// the hook's own classification: an incomplete cancellation is fatal.
    #[must_use]
    pub fn from_hook(stage: Stage, hook: &str, err: HookError) -> Self {
        if stage == Stage::OnCancel {
            return Self::Consistency {
                stage,
                hook: hook.to_string(),
                reason: err.to_string(),
            };
        }
        if stage.is_post_persist() {
            // Notification stages never abort anything; whatever the hook's
            // own classification, the failure is a plain hook failure until
            // the engine attaches the persisted document
            let (HookError::Validation(reason)
            | HookError::Consistency(reason)
            | HookError::Failed(reason)) = err;
            return Self::HookFailed {
                stage,
                hook: hook.to_string(),
                reason,
            };
        }
        match err {
            HookError::Validation(reason) => Self::Validation(reason),
            HookError::Consistency(reason) => Self::Consistency {
                stage,
                hook: hook.to_string(),
                reason,
            },
            HookError::Failed(reason) => Self::HookFailed {
                stage,
                hook: hook.to_string(),
                reason,
            },
        }
    }

    /// Attach the persisted document to a notification-stage failure
    ///
    /// Callers of `insert`/`save`/`submit` keep the persisted document (and
    /// its assigned identifier) even when a post-persist hook fails.
    #[must_use]
    pub fn after_persist(self, document: Document) -> Self {
        match self {
            Self::HookFailed {
                stage,
                hook,
                reason,
            } => Self::PostPersist {
                stage,
                hook,
                reason,
                document,
            },
            other => other,
        }
    }

    /// Whether the message is meant for end users (vs. operators)
    #[inline]
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Permission(_)
                | Self::NotFound { .. }
                | Self::IllegalTransition { .. }
        )
    }

    /// Whether this is a fatal consistency condition
    #[inline]
    #[must_use]
    pub fn is_consistency_fault(&self) -> bool {
        matches!(self, Self::Consistency { .. })
    }
}
