//! Lifecycle stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named point in a document's lifecycle where extension hooks run
///
/// Stage order for a full create-to-submit flow:
/// `BeforeInsert → Autoname → BeforeValidate → Validate → BeforeSave →
/// BeforeSubmit → AfterInsert → OnUpdate → OnSubmit → OnCancel`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Before a new instance enters the pipeline
    BeforeInsert,
    /// Identifier assignment; the base behavior generates a unique name
    Autoname,
    /// Before validation, may normalize fields
    BeforeValidate,
    /// Validation proper; the usual source of user-facing rejections
    Validate,
    /// Last chance to touch fields before persistence
    BeforeSave,
    /// Before a draft is finalized
    BeforeSubmit,
    /// After a new instance was persisted (notification, read-only)
    AfterInsert,
    /// After an existing instance was persisted (notification, read-only)
    OnUpdate,
    /// After submission was persisted (notification, read-only)
    OnSubmit,
    /// Cleanup/reversal during cancellation; failure is a consistency fault
    OnCancel,
}

impl Stage {
    /// All stages, in lifecycle order
    pub const ALL: [Stage; 10] = [
        Stage::BeforeInsert,
        Stage::Autoname,
        Stage::BeforeValidate,
        Stage::Validate,
        Stage::BeforeSave,
        Stage::BeforeSubmit,
        Stage::AfterInsert,
        Stage::OnUpdate,
        Stage::OnSubmit,
        Stage::OnCancel,
    ];

    /// Snake-case stage name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeInsert => "before_insert",
            Self::Autoname => "autoname",
            Self::BeforeValidate => "before_validate",
            Self::Validate => "validate",
            Self::BeforeSave => "before_save",
            Self::BeforeSubmit => "before_submit",
            Self::AfterInsert => "after_insert",
            Self::OnUpdate => "on_update",
            Self::OnSubmit => "on_submit",
            Self::OnCancel => "on_cancel",
        }
    }

    /// Whether hooks at this stage observe a persisted document
    ///
    /// Post-persist stages are notification points; field changes made there
    /// are not written back.
    #[must_use]
    pub fn is_post_persist(self) -> bool {
        matches!(self, Self::AfterInsert | Self::OnUpdate | Self::OnSubmit)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
