use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use super::error::CompileError;
use super::memory::WorkingMemory;
use super::result::ResultHandle;
use super::rule::CompiledRule;
use super::shape::{FactGroup, FactShape, find_shape};
use crate::engine::{Diagnostics, FireError};
use crate::types::fact::RuleLogger;

/// A compiled, immutable rule program. Thread-safe and designed to live behind `Arc`.
///
/// # Example
///
/// ```
/// use ruleflow::RuleProgram;
///
/// let program = RuleProgram::from_source(
///     "declare Applicant\n  age: int\nend\nrule adult:\n  Applicant.age >= 18\n  then set adult = true",
/// )
/// .unwrap();
/// assert_eq!(program.agenda_order(), vec!["adult"]);
/// ```
#[derive(Debug)]
pub struct RuleProgram {
    /// Rules in topological order; `rules[i].index == i`.
    pub(crate) rules: Vec<CompiledRule>,
    pub(crate) rule_indices: HashMap<String, usize>,
    /// Indices into `rules` of rules with actions, in firing order.
    pub(crate) agenda: Vec<usize>,
    pub(crate) groups: Vec<FactGroup>,
    pub(crate) digest: blake3::Hash,
}

impl RuleProgram {
    /// Parse and compile rule text.
    ///
    /// # Errors
    ///
    /// Returns [`Diagnostics`] with one message for a syntax error, or one
    /// message per semantic problem.
    pub fn from_source(source: &str) -> Result<Self, Diagnostics> {
        let parsed = crate::parse::parse(source).map_err(|e| Diagnostics::new(vec![e.to_string()]))?;
        crate::compile::compile(&parsed, source)
            .map_err(|errors: Vec<CompileError>| errors.iter().collect())
    }

    /// BLAKE3 digest of the exact source text this program was compiled from.
    #[must_use]
    pub fn source_digest(&self) -> &blake3::Hash {
        &self.digest
    }

    /// Whether this program was compiled from `source`.
    #[must_use]
    pub fn compiled_from(&self, source: &str) -> bool {
        self.digest == blake3::hash(source.as_bytes())
    }

    #[must_use]
    pub fn groups(&self) -> &[FactGroup] {
        &self.groups
    }

    #[must_use]
    pub fn shape(&self, name: &str) -> Option<&FactShape> {
        find_shape(&self.groups, name)
    }

    /// Rule names in evaluation (topological) order.
    #[must_use]
    pub fn execution_order(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Names of rules with actions, in the order their actions run.
    #[must_use]
    pub fn agenda_order(&self) -> Vec<&str> {
        self.agenda
            .iter()
            .map(|&i| self.rules[i].name.as_str())
            .collect()
    }

    /// Names of the rules a given rule references.
    ///
    /// Returns `None` if the rule name is not found.
    #[must_use]
    pub fn dependencies_of(&self, rule_name: &str) -> Option<Vec<&str>> {
        let idx = *self.rule_indices.get(rule_name)?;
        Some(self.rules[idx].condition.rule_refs())
    }

    /// Evaluate every rule once against `memory` and run the actions of
    /// those that hold.
    pub(crate) fn fire(
        &self,
        memory: &WorkingMemory,
        result: Option<&ResultHandle>,
        logger: Option<&RuleLogger>,
        deadline: Option<Instant>,
    ) -> Result<usize, FireError> {
        crate::evaluate::fire(self, memory, result, logger, deadline)
    }
}

impl fmt::Display for RuleProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuleProgram({} rules, {} activations, {} packages)",
            self.rules.len(),
            self.agenda.len(),
            self.groups.len(),
        )
    }
}
