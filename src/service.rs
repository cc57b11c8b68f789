//! Validated rule mutations that keep the program cache fresh.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::cache::ProgramCache;
use crate::config::RuntimeConfig;
use crate::engine::Engine;
use crate::error::RuleError;
use crate::store::{Page, RuleDefinition, RuleId, RuleSummary};

const NAME_LEN: std::ops::RangeInclusive<usize> = 4..=10;

/// Check a (trimmed) rule name: 4 to 10 ASCII letters, digits or underscores.
///
/// # Errors
///
/// Returns [`RuleError::Validation`] describing the expected format.
pub fn validate_name(name: &str) -> Result<(), RuleError> {
    let well_formed = NAME_LEN.contains(&name.len())
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if well_formed {
        Ok(())
    } else {
        Err(RuleError::Validation(format!(
            "rule name {name:?} must be 4-10 letters, digits or underscores"
        )))
    }
}

/// Create, update, delete and list rules.
///
/// Every successful mutation invalidates the cached program for the rule
/// before returning, so executions that start afterwards see the new text.
pub struct RuleService<E: Engine> {
    cache: Arc<ProgramCache<E>>,
    config: RuntimeConfig,
    mutations: Mutex<()>,
}

impl<E: Engine> RuleService<E> {
    pub fn new(cache: Arc<ProgramCache<E>>, config: RuntimeConfig) -> Self {
        Self {
            cache,
            config,
            mutations: Mutex::new(()),
        }
    }

    /// Insert a rule (no id) or replace one (with id). Returns the rule's id.
    ///
    /// # Errors
    ///
    /// - [`RuleError::Validation`] for a malformed name or empty text.
    /// - [`RuleError::Syntax`] if the text does not compile; nothing is saved.
    /// - [`RuleError::NotFound`] when updating an id that does not exist.
    /// - [`RuleError::DuplicateName`] if another rule has the name.
    pub fn save(&self, mut rule: RuleDefinition) -> Result<RuleId, RuleError> {
        rule.name = rule.name.trim().to_owned();
        validate_name(&rule.name)?;
        if rule.source.trim().is_empty() {
            return Err(RuleError::Validation("rule text must not be empty".into()));
        }
        rule.description = rule
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        if self.config.verify_before_save
            && let Err(diagnostics) = self.cache.engine().verify(&rule.source)
        {
            warn!(rule = %rule.name, problems = diagnostics.len(), "rejected rule text");
            return Err(RuleError::Syntax(diagnostics));
        }

        let _guard = self.mutations.lock();
        let store = self.cache.store();

        let existing = match rule.id {
            Some(id) => Some(
                store
                    .find_by_id(id)?
                    .ok_or(RuleError::NotFound(id.into()))?,
            ),
            None => None,
        };
        if store.exists_by_name(&rule.name, rule.id)? {
            return Err(RuleError::DuplicateName(rule.name));
        }

        let now = Utc::now();
        rule.created_at = existing
            .as_ref()
            .and_then(|e| e.created_at)
            .or(Some(now));
        rule.updated_at = Some(now);

        let name = rule.name.clone();
        let id = store.save(rule)?;
        self.cache.invalidate(id);
        info!(rule_id = %id, rule = %name, created = existing.is_none(), "saved rule");
        Ok(id)
    }

    /// Remove a rule. Returns the removed definition.
    ///
    /// # Errors
    ///
    /// [`RuleError::NotFound`] if there is no such rule.
    pub fn delete_by_id(&self, id: RuleId) -> Result<RuleDefinition, RuleError> {
        let _guard = self.mutations.lock();
        let store = self.cache.store();
        let existing = store
            .find_by_id(id)?
            .ok_or(RuleError::NotFound(id.into()))?;
        let removed = store.delete_by_id(id)?.unwrap_or(existing);
        self.cache.invalidate(id);
        info!(rule_id = %id, rule = %removed.name, "deleted rule");
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns [`RuleError::Store`] if the store fails.
    pub fn get_by_id(&self, id: RuleId) -> Result<Option<RuleDefinition>, RuleError> {
        Ok(self.cache.store().find_by_id(id)?)
    }

    /// 1-based page of rule summaries. `page_size` is capped at the configured maximum.
    ///
    /// # Errors
    ///
    /// [`RuleError::Validation`] if `page_no` or `page_size` is zero.
    pub fn page(
        &self,
        page_no: u32,
        page_size: u32,
        name_filter: Option<&str>,
    ) -> Result<Page<RuleSummary>, RuleError> {
        if page_no == 0 || page_size == 0 {
            return Err(RuleError::Validation(
                "page number and page size start at 1".into(),
            ));
        }
        let page_size = page_size.min(self.config.max_page_size.max(1));
        let name_filter = name_filter.map(str::trim).filter(|f| !f.is_empty());
        Ok(self.cache.store().page(page_no, page_size, name_filter)?)
    }
}

impl<E: Engine> std::fmt::Debug for RuleService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleService")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
