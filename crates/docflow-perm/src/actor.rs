//! Actors and operations

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Reserved user name that bypasses document-layer restrictions
pub const ADMINISTRATOR: &str = "Administrator";

/// The caller of an operation: a user and the roles they hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User identifier
    pub user: String,
    /// Roles held by the user
    pub roles: HashSet<String>,
}

impl Actor {
    /// Create an actor with no roles
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            roles: HashSet::new(),
        }
    }

    /// Builder-style role grant
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Whether the actor holds the given role
    #[inline]
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Whether the actor holds any of the given roles
    #[must_use]
    pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a str>) -> bool {
        roles.into_iter().any(|r| self.has_role(r))
    }

    /// Whether this is the administrator account
    #[inline]
    #[must_use]
    pub fn is_administrator(&self) -> bool {
        self.user == ADMINISTRATOR
    }
}

/// Operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Read an instance or list instances
    Read,
    /// Create or modify a draft
    Write,
    /// Finalize a draft
    Submit,
    /// Cancel a draft or submitted instance
    Cancel,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Submit => "submit",
            Self::Cancel => "cancel",
        };
        write!(f, "{s}")
    }
}
