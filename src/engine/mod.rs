//! The capability interface between the runtime and a rule engine.
//!
//! The runtime only ever compiles source text into a program, opens sessions
//! from a program, inserts facts, fires once and disposes. Any engine offering
//! those operations can sit behind [`Engine`]; [`DslEngine`] is the one this
//! crate ships.

mod dsl;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::{Fact, FactGroup};

pub use dsl::{DslEngine, DslSession};

/// Diagnostic messages reported by an engine for source text that does not compile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diagnostics(Vec<String>);

impl Diagnostics {
    #[must_use]
    pub fn new(messages: Vec<String>) -> Self {
        Self(messages)
    }

    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<E: fmt::Display> FromIterator<E> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self(iter.into_iter().map(|e| e.to_string()).collect())
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("\n"))
    }
}

/// Why a firing pass did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FireError {
    #[error("session has already fired")]
    AlreadyFired,

    #[error("session has been disposed")]
    Disposed,

    #[error("firing exceeded its deadline after {fired} activations")]
    DeadlineExceeded { fired: usize },

    #[error("rule '{rule}' failed: {message}")]
    Rule { rule: String, message: String },
}

/// Compiles rule text and opens execution sessions.
pub trait Engine: Send + Sync + 'static {
    type Program: Program;
    type Session: Session;

    /// Compile source text into an executable program.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`Diagnostics`] when the text does not compile.
    fn compile(&self, source: &str) -> Result<Self::Program, Diagnostics>;

    /// Check that source text compiles without keeping the result.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`Diagnostics`] when the text does not compile.
    fn verify(&self, source: &str) -> Result<(), Diagnostics> {
        self.compile(source).map(drop)
    }

    /// Open a fresh, isolated session over a compiled program.
    fn new_session(&self, program: &Arc<Self::Program>) -> Self::Session;
}

/// An immutable compiled program, shared across threads.
pub trait Program: Send + Sync + 'static {
    /// Declared fact shapes, grouped by the package that declared them.
    fn fact_groups(&self) -> &[FactGroup];
}

/// A single-use execution context. Owned by exactly one invocation.
pub trait Session {
    fn insert(&mut self, fact: Fact);

    /// Run every applicable rule once. Returns the number of rule activations.
    ///
    /// # Errors
    ///
    /// Returns [`FireError`] if the session cannot fire or a rule fails.
    fn fire_all(&mut self, deadline: Option<Instant>) -> Result<usize, FireError>;

    /// Release the session's resources. Further firing is rejected.
    fn dispose(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_join_with_newlines() {
        let diags = Diagnostics::new(vec!["first".into(), "second".into()]);
        assert_eq!(diags.to_string(), "first\nsecond");
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn diagnostics_from_errors() {
        let diags: Diagnostics = [FireError::AlreadyFired, FireError::Disposed]
            .iter()
            .collect();
        assert_eq!(
            diags.messages(),
            ["session has already fired", "session has been disposed"]
        );
    }
}
