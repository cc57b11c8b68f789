mod binder;
mod cache;
mod compile;
mod config;
mod engine;
mod error;
mod evaluate;
mod parse;
mod runtime;
mod service;
mod store;
mod types;

use std::sync::Arc;

pub use binder::{BindDiagnostic, BindReport, active_group, bind, instantiate};
pub use cache::ProgramCache;
pub use config::{ConfigError, RuntimeConfig};
pub use engine::{Diagnostics, DslEngine, DslSession, Engine, FireError, Program, Session};
pub use error::{RuleError, RuleKey};
pub use parse::{DEFAULT_PACKAGE, ParseError};
pub use runtime::{EXECUTION_FAILED, ExecutionRuntime, SessionGuard};
pub use service::{RuleService, validate_name};
pub use store::{
    MemoryRuleStore, Page, RuleDefinition, RuleId, RuleStore, RuleSummary, StoreError,
};
pub(crate) use types::CompiledRule;
pub use types::{
    Action, AppContext, CompareOp, CompileError, ExecutionResult, Expr, Fact, FactGroup,
    FactInstance, FactShape, FieldDecl, FieldType, FieldValue, Global, Operand, Params,
    ResultHandle, Rule, RuleLogger, RuleProgram, Value, WorkingMemory, find_shape,
};

/// One engine, store, cache, runtime and rule service wired together.
///
/// The runtime and the service share the cache, so a save or delete through
/// [`rules`](Self::rules) is visible to the next execution through
/// [`runtime`](Self::runtime).
///
/// ```
/// use std::sync::Arc;
/// use ruleflow::{DslEngine, DynamicRules, MemoryRuleStore, Params, RuleDefinition, RuntimeConfig};
///
/// let rules = DynamicRules::new(DslEngine::new(), Arc::new(MemoryRuleStore::new()), RuntimeConfig::default());
/// let id = rules
///     .rules()
///     .save(RuleDefinition::new("always", "rule yes:\n  NOT params.x == 1\n  then set ok = true"))
///     .unwrap();
/// let result = rules.runtime().execute_by_id(id, &Params::new());
/// assert_eq!(serde_json::to_string(&result).unwrap(), r#"{"code":0,"data":{"ok":true}}"#);
/// ```
#[derive(Debug)]
pub struct DynamicRules<E: Engine> {
    cache: Arc<ProgramCache<E>>,
    runtime: ExecutionRuntime<E>,
    rules: RuleService<E>,
}

impl<E: Engine> DynamicRules<E> {
    pub fn new(engine: E, store: Arc<dyn RuleStore>, config: RuntimeConfig) -> Self {
        let cache = Arc::new(ProgramCache::new(Arc::new(engine), store));
        Self {
            runtime: ExecutionRuntime::new(Arc::clone(&cache), config.clone()),
            rules: RuleService::new(Arc::clone(&cache), config),
            cache,
        }
    }

    #[must_use]
    pub fn runtime(&self) -> &ExecutionRuntime<E> {
        &self.runtime
    }

    #[must_use]
    pub fn rules(&self) -> &RuleService<E> {
        &self.rules
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ProgramCache<E>> {
        &self.cache
    }
}
