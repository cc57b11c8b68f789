//! Persistence of rule definitions.
//!
//! The runtime only reads source text through [`RuleStore`]; writes go through
//! the [`RuleService`](crate::RuleService) so that the program cache is
//! invalidated after every mutation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store-assigned rule identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RuleId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A persisted rule: a unique name plus the source text compiled on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// `None` until the store assigns one on first save.
    #[serde(default)]
    pub id: Option<RuleId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RuleDefinition {
    /// A definition that has not been saved yet.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            source: source.into(),
            created_at: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: RuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn summary(&self) -> Option<RuleSummary> {
        Some(RuleSummary {
            id: self.id?,
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
        })
    }
}

/// Listing view of a rule, without its source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub id: RuleId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of a listing plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rule {0} does not exist")]
    Missing(RuleId),

    #[error("rule store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed storage of rule definitions.
pub trait RuleStore: Send + Sync + fmt::Debug {
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read.
    fn find_by_id(&self, id: RuleId) -> Result<Option<RuleDefinition>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read.
    fn find_by_name(&self, name: &str) -> Result<Option<RuleDefinition>, StoreError>;

    /// Insert (no id) or replace (with id) a definition. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Missing`] when replacing an id the store does not hold.
    fn save(&self, rule: RuleDefinition) -> Result<RuleId, StoreError>;

    /// Returns the removed definition, if there was one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be written.
    fn delete_by_id(&self, id: RuleId) -> Result<Option<RuleDefinition>, StoreError>;

    /// Whether a rule other than `excluding` already uses `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read.
    fn exists_by_name(&self, name: &str, excluding: Option<RuleId>) -> Result<bool, StoreError>;

    /// 1-based page of summaries ordered by id, optionally filtered by a name substring.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read.
    fn page(
        &self,
        page_no: u32,
        page_size: u32,
        name_filter: Option<&str>,
    ) -> Result<Page<RuleSummary>, StoreError>;
}

/// In-process [`RuleStore`].
#[derive(Debug)]
pub struct MemoryRuleStore {
    rules: RwLock<BTreeMap<RuleId, RuleDefinition>>,
    next_id: AtomicU64,
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self {
            rules: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl MemoryRuleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

impl RuleStore for MemoryRuleStore {
    fn find_by_id(&self, id: RuleId) -> Result<Option<RuleDefinition>, StoreError> {
        Ok(self.rules.read().get(&id).cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<RuleDefinition>, StoreError> {
        Ok(self.rules.read().values().find(|r| r.name == name).cloned())
    }

    fn save(&self, mut rule: RuleDefinition) -> Result<RuleId, StoreError> {
        let mut rules = self.rules.write();
        let id = match rule.id {
            Some(id) => {
                let existing = rules.get(&id).ok_or(StoreError::Missing(id))?;
                rule.created_at = existing.created_at.or(rule.created_at);
                id
            }
            None => {
                let id = RuleId(self.next_id.fetch_add(1, Ordering::Relaxed));
                rule.id = Some(id);
                id
            }
        };
        rules.insert(id, rule);
        Ok(id)
    }

    fn delete_by_id(&self, id: RuleId) -> Result<Option<RuleDefinition>, StoreError> {
        Ok(self.rules.write().remove(&id))
    }

    fn exists_by_name(&self, name: &str, excluding: Option<RuleId>) -> Result<bool, StoreError> {
        Ok(self
            .rules
            .read()
            .values()
            .any(|r| r.name == name && excluding.is_none_or(|ex| r.id != Some(ex))))
    }

    fn page(
        &self,
        page_no: u32,
        page_size: u32,
        name_filter: Option<&str>,
    ) -> Result<Page<RuleSummary>, StoreError> {
        let rules = self.rules.read();
        let matching: Vec<&RuleDefinition> = rules
            .values()
            .filter(|r| name_filter.is_none_or(|f| r.name.contains(f)))
            .collect();
        let skip = (page_no.saturating_sub(1) as usize).saturating_mul(page_size as usize);
        let items = matching
            .iter()
            .skip(skip)
            .take(page_size as usize)
            .filter_map(|r| r.summary())
            .collect();
        Ok(Page {
            total: matching.len() as u64,
            items,
        })
    }
}
