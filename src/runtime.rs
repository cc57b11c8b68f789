//! One rule invocation, from cache lookup to disposed session.

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info_span, warn};

use crate::binder;
use crate::cache::ProgramCache;
use crate::config::RuntimeConfig;
use crate::engine::{Engine, Session};
use crate::error::{RuleError, RuleKey};
use crate::store::RuleId;
use crate::{AppContext, ExecutionResult, Fact, Global, Params, ResultHandle, RuleLogger};

/// Generic caller-facing text for failures whose detail stays in the logs.
pub const EXECUTION_FAILED: &str = "rule execution failed";

/// Owns a session and disposes it exactly once: explicitly through
/// [`dispose`](Self::dispose), or on drop.
#[derive(Debug)]
pub struct SessionGuard<S: Session> {
    session: S,
    disposed: bool,
}

impl<S: Session> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            disposed: false,
        }
    }

    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.session.dispose();
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<S: Session> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: Session> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Executes cached rule programs over request parameters.
///
/// The `execute_*` methods never fail: every error becomes a failure
/// [`ExecutionResult`]. The `try_execute_*` variants return the typed error instead.
pub struct ExecutionRuntime<E: Engine> {
    cache: Arc<ProgramCache<E>>,
    config: RuntimeConfig,
    context: Arc<AppContext>,
}

impl<E: Engine> ExecutionRuntime<E> {
    pub fn new(cache: Arc<ProgramCache<E>>, config: RuntimeConfig) -> Self {
        let context = Arc::new(AppContext::new(config.context.clone()));
        Self {
            cache,
            config,
            context,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ProgramCache<E>> {
        &self.cache
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn execute_by_id(&self, id: RuleId, params: &Params) -> ExecutionResult {
        let key = RuleKey::Id(id);
        let span = info_span!("execute", rule = %key);
        let _enter = span.enter();
        let outcome = self.try_execute_by_id(id, params);
        self.respond(&key, outcome)
    }

    pub fn execute_by_name(&self, name: &str, params: &Params) -> ExecutionResult {
        let key = RuleKey::Name(name.to_owned());
        let span = info_span!("execute", rule = %key);
        let _enter = span.enter();
        let outcome = self.try_execute_by_name(name, params);
        self.respond(&key, outcome)
    }

    /// # Errors
    ///
    /// [`RuleError::NotFound`], [`RuleError::Compile`] or [`RuleError::Store`]
    /// while resolving the program; [`RuleError::Execution`] if binding or
    /// firing failed.
    pub fn try_execute_by_id(
        &self,
        id: RuleId,
        params: &Params,
    ) -> Result<ExecutionResult, RuleError> {
        let program = self.cache.get_by_id(id)?;
        self.run(&id.to_string(), &program, params)
    }

    /// # Errors
    ///
    /// Same as [`try_execute_by_id`](Self::try_execute_by_id).
    pub fn try_execute_by_name(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<ExecutionResult, RuleError> {
        let program = self.cache.get_by_name(name)?;
        self.run(name, &program, params)
    }

    fn run(
        &self,
        label: &str,
        program: &Arc<E::Program>,
        params: &Params,
    ) -> Result<ExecutionResult, RuleError> {
        let result = ResultHandle::new();
        let deadline = self.config.fire_deadline();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut session = SessionGuard::new(self.cache.engine().new_session(program));
            self.inject_globals(&mut *session, label);

            let report = binder::bind(&mut *session, program.as_ref(), params, &result);
            debug!(
                package = report.package.as_deref().unwrap_or("-"),
                facts = report.facts,
                skipped = report.diagnostics.len(),
                "bound parameters"
            );

            let fired = session.fire_all(deadline);
            session.dispose();
            fired
        }));

        match outcome {
            Ok(Ok(fired)) => {
                debug!(fired, "rules fired");
                Ok(result.snapshot())
            }
            Ok(Err(err)) => Err(RuleError::Execution(err.to_string())),
            Err(payload) => Err(RuleError::Execution(panic_message(payload.as_ref()))),
        }
    }

    fn inject_globals(&self, session: &mut E::Session, label: &str) {
        session.insert(Fact::Global(Global::Logger(RuleLogger::new(label))));
        session.insert(Fact::Global(Global::AppContext(Arc::clone(&self.context))));
        session.insert(Fact::Global(Global::Store(Arc::clone(self.cache.store()))));
    }

    fn respond(&self, key: &RuleKey, outcome: Result<ExecutionResult, RuleError>) -> ExecutionResult {
        let err = match outcome {
            Ok(result) => return result,
            Err(err) => err,
        };
        match &err {
            RuleError::NotFound(_) => {
                warn!(rule = %key, "rule not found");
                ExecutionResult::failure(err.to_string())
            }
            _ => {
                error!(rule = %key, error = %err, "rule execution failed");
                if self.config.expose_failure_detail {
                    ExecutionResult::failure(err.to_string())
                } else {
                    ExecutionResult::failure(EXECUTION_FAILED)
                }
            }
        }
    }
}

impl<E: Engine> std::fmt::Debug for ExecutionRuntime<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRuntime")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("engine panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("engine panicked: {s}")
    } else {
        "engine panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::DslEngine;
    use crate::store::{MemoryRuleStore, RuleDefinition, RuleStore};

    const LOAN: &str = r#"
package loans

declare Applicant
    age: int
    income: float
end

rule adult:
    Applicant.age >= 18

rule approve:
    adult AND Applicant.income >= 1000.0
    then
        set decision = "approve"
        set income = Applicant.income

rule reject (priority 1):
    NOT adult
    then
        fail "applicant too young"
"#;

    fn runtime(config: RuntimeConfig) -> ExecutionRuntime<DslEngine> {
        let store = Arc::new(MemoryRuleStore::new());
        store.save(RuleDefinition::new("loan", LOAN)).unwrap();
        store
            .save(RuleDefinition::new("region", "rule eu:\n  context.region == \"eu\"\n  then set eu = true"))
            .unwrap();
        let cache = Arc::new(ProgramCache::new(Arc::new(DslEngine::new()), store));
        ExecutionRuntime::new(cache, config)
    }

    fn params(json: serde_json::Value) -> Params {
        json.as_object().cloned().unwrap()
    }

    #[test]
    fn executes_bound_facts() {
        let runtime = runtime(RuntimeConfig::default());
        let result = runtime.execute_by_id(RuleId(1), &params(json!({"age": 30, "income": "2500"})));
        assert!(result.is_success());
        assert_eq!(result.data(), Some(&json!({"decision": "approve", "income": 2500.0})));
    }

    #[test]
    fn rule_failures_come_back_as_failure_results() {
        let runtime = runtime(RuntimeConfig::default());
        let result = runtime.execute_by_name("loan", &params(json!({"age": 12})));
        assert_eq!(result.code(), ExecutionResult::FAILURE);
        assert_eq!(result.message(), Some("applicant too young"));
    }

    #[test]
    fn context_properties_reach_rules() {
        let mut config = RuntimeConfig::default();
        config.context.insert("region".into(), json!("eu"));
        let runtime = runtime(config);
        let result = runtime.execute_by_id(RuleId(2), &Params::new());
        assert_eq!(result.data(), Some(&json!({"eu": true})));
    }

    #[test]
    fn unknown_rule_is_a_failure_result() {
        let runtime = runtime(RuntimeConfig::default());
        let result = runtime.execute_by_id(RuleId(99), &Params::new());
        assert_eq!(result.message(), Some("rule not found: id 99"));
        assert!(runtime.try_execute_by_name("nope", &Params::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn compile_failures_are_generic_unless_exposed() {
        let runtime = runtime(RuntimeConfig::default());
        runtime.cache().store().save(RuleDefinition::new("broken", "rule a:\n  b")).unwrap();
        let result = runtime.execute_by_name("broken", &Params::new());
        assert_eq!(result.message(), Some(EXECUTION_FAILED));

        let exposing = ExecutionRuntime::new(
            Arc::clone(runtime.cache()),
            RuntimeConfig {
                expose_failure_detail: true,
                ..RuntimeConfig::default()
            },
        );
        let result = exposing.execute_by_name("broken", &Params::new());
        assert!(result.message().unwrap().contains("undefined rule reference 'b'"));
    }

    #[test]
    fn empty_params_do_not_satisfy_request_comparisons() {
        let runtime = runtime(RuntimeConfig {
            expose_failure_detail: true,
            ..RuntimeConfig::default()
        });
        let store = runtime.cache().store();
        let plain = store
            .save(RuleDefinition::new("plain", "rule r:\n  params.x == 0\n  then set hit = true"))
            .unwrap();
        let shadowed = store
            .save(RuleDefinition::new(
                "shadowed",
                "declare params\n  x: int\nend\nrule r:\n  params.x == 0\n  then set hit = true",
            ))
            .unwrap();

        let result = runtime.execute_by_id(plain, &Params::new());
        assert!(result.is_success());
        assert_eq!(result.data(), None);
        let result = runtime.execute_by_id(plain, &params(json!({"x": 0})));
        assert_eq!(result.data(), Some(&json!({"hit": true})));

        let result = runtime.execute_by_id(shadowed, &Params::new());
        assert!(!result.is_success());
        assert!(result.message().unwrap().contains("fact type name 'params' is reserved"));
    }

    #[test]
    fn panic_payloads_are_described() {
        assert_eq!(panic_message(&"boom"), "engine panicked: boom");
        assert_eq!(panic_message(&String::from("bang")), "engine panicked: bang");
        assert_eq!(panic_message(&7_u8), "engine panicked");
    }
}
