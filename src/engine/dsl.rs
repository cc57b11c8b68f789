use std::sync::Arc;
use std::time::Instant;

use super::{Diagnostics, Engine, FireError, Program, Session};
use crate::store::RuleStore;
use crate::{Fact, FactGroup, Global, ResultHandle, RuleLogger, RuleProgram, WorkingMemory};

/// Engine for the built-in rule language.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ruleflow::{DslEngine, Engine, Fact, Params, Session};
///
/// let engine = DslEngine::new();
/// let program = Arc::new(engine.compile("rule big:\n  params.n > 10").unwrap());
/// let mut session = engine.new_session(&program);
/// let mut params = Params::new();
/// params.insert("n".into(), 11.into());
/// session.insert(Fact::Params(params));
/// assert_eq!(session.fire_all(None).unwrap(), 0);
/// session.dispose();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DslEngine;

impl DslEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Engine for DslEngine {
    type Program = RuleProgram;
    type Session = DslSession;

    fn compile(&self, source: &str) -> Result<RuleProgram, Diagnostics> {
        RuleProgram::from_source(source)
    }

    fn new_session(&self, program: &Arc<RuleProgram>) -> DslSession {
        DslSession::new(Arc::clone(program))
    }
}

impl Program for RuleProgram {
    fn fact_groups(&self) -> &[FactGroup] {
        self.groups()
    }
}

/// A single-use session over a [`RuleProgram`].
///
/// Inserted facts are flattened into a [`WorkingMemory`]; the result handle
/// and logger are kept aside for the actions that need them.
#[derive(Debug)]
pub struct DslSession {
    program: Arc<RuleProgram>,
    memory: WorkingMemory,
    result: Option<ResultHandle>,
    logger: Option<RuleLogger>,
    store: Option<Arc<dyn RuleStore>>,
    facts: usize,
    fired: bool,
    disposed: bool,
}

impl DslSession {
    fn new(program: Arc<RuleProgram>) -> Self {
        Self {
            program,
            memory: WorkingMemory::new(),
            result: None,
            logger: None,
            store: None,
            facts: 0,
            fired: false,
            disposed: false,
        }
    }

    #[must_use]
    pub fn program(&self) -> &Arc<RuleProgram> {
        &self.program
    }

    #[must_use]
    pub fn memory(&self) -> &WorkingMemory {
        &self.memory
    }

    /// Number of facts inserted so far.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.facts
    }

    /// The rule store handed in as a global, if any.
    #[must_use]
    pub fn global_store(&self) -> Option<&Arc<dyn RuleStore>> {
        self.store.as_ref()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Session for DslSession {
    fn insert(&mut self, fact: Fact) {
        if self.disposed {
            tracing::warn!(kind = fact.kind(), "insert into disposed session ignored");
            return;
        }
        self.facts += 1;
        match fact {
            Fact::Record(instance) => self.memory.insert_instance(&instance),
            Fact::Params(params) => {
                for (key, value) in &params {
                    self.memory.insert_json(&format!("params.{key}"), value);
                }
            }
            Fact::Result(handle) => self.result = Some(handle),
            Fact::Global(Global::Logger(logger)) => self.logger = Some(logger),
            Fact::Global(Global::AppContext(context)) => {
                for (key, value) in context.properties() {
                    self.memory.insert_json(&format!("context.{key}"), value);
                }
            }
            Fact::Global(Global::Store(store)) => self.store = Some(store),
        }
    }

    fn fire_all(&mut self, deadline: Option<Instant>) -> Result<usize, FireError> {
        if self.disposed {
            return Err(FireError::Disposed);
        }
        if self.fired {
            return Err(FireError::AlreadyFired);
        }
        self.fired = true;
        self.program.fire(
            &self.memory,
            self.result.as_ref(),
            self.logger.as_ref(),
            deadline,
        )
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.memory = WorkingMemory::new();
        self.result = None;
        self.logger = None;
        self.store = None;
    }
}
