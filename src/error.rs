use std::fmt;

use thiserror::Error;

use crate::engine::Diagnostics;
use crate::store::{RuleId, StoreError};

/// How a caller addressed a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKey {
    Id(RuleId),
    Name(String),
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKey::Id(id) => write!(f, "id {id}"),
            RuleKey::Name(name) => write!(f, "name '{name}'"),
        }
    }
}

impl From<RuleId> for RuleKey {
    fn from(id: RuleId) -> Self {
        RuleKey::Id(id)
    }
}

impl From<&str> for RuleKey {
    fn from(name: &str) -> Self {
        RuleKey::Name(name.to_owned())
    }
}

/// Unified error type of the program cache and the rule service.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Malformed input; nothing was persisted.
    #[error("invalid rule: {0}")]
    Validation(String),

    #[error("rule name '{0}' is already taken")]
    DuplicateName(String),

    /// Rule text was rejected before saving; nothing was persisted.
    #[error("rule text does not compile:\n{0}")]
    Syntax(Diagnostics),

    #[error("rule not found: {0}")]
    NotFound(RuleKey),

    /// Persisted rule text failed to compile while building its program.
    #[error("rule {id} failed to compile:\n{diagnostics}")]
    Compile { id: RuleId, diagnostics: Diagnostics },

    #[error("rule execution failed: {0}")]
    Execution(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RuleError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuleError::NotFound(_))
    }
}
