use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use super::Value;
use super::result::ResultHandle;
use crate::store::RuleStore;

/// Untyped request parameters, as received from the caller.
pub type Params = Map<String, JsonValue>;

/// A field of a [`FactInstance`]: either a scalar or a nested instance.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(Value),
    Record(FactInstance),
}

/// A typed object built from request parameters for one declared fact shape.
///
/// Fields that could not be populated are simply absent.
#[derive(Debug, Clone, PartialEq)]
pub struct FactInstance {
    shape: String,
    fields: BTreeMap<String, FieldValue>,
}

impl FactInstance {
    pub fn new(shape: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn shape(&self) -> &str {
        &self.shape
    }

    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    /// Scalar value of a direct field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self.fields.get(field)? {
            FieldValue::Scalar(v) => Some(v),
            FieldValue::Record(_) => None,
        }
    }

    /// Nested instance held by a direct field.
    #[must_use]
    pub fn record(&self, field: &str) -> Option<&FactInstance> {
        match self.fields.get(field)? {
            FieldValue::Record(r) => Some(r),
            FieldValue::Scalar(_) => None,
        }
    }

    /// Scalar value at a dot-separated path relative to this instance.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        match path.split_once('.') {
            Some((head, rest)) => self.record(head)?.get_path(rest),
            None => self.get(path),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Forwards messages emitted by rules to `tracing`, tagged with the rule they came from.
#[derive(Debug, Clone)]
pub struct RuleLogger {
    rule: String,
}

impl RuleLogger {
    pub fn new(rule: impl Into<String>) -> Self {
        Self { rule: rule.into() }
    }

    #[must_use]
    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn info(&self, fired_by: &str, message: &str) {
        tracing::info!(target: "ruleflow::rule", rule = %self.rule, fired_by, "{message}");
    }
}

/// Application-level properties visible to rules under the `context.` prefix.
#[derive(Debug, Clone, Default)]
pub struct AppContext {
    properties: Map<String, JsonValue>,
}

impl AppContext {
    #[must_use]
    pub fn new(properties: Map<String, JsonValue>) -> Self {
        Self { properties }
    }

    #[must_use]
    pub fn properties(&self) -> &Map<String, JsonValue> {
        &self.properties
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.properties.get(key)
    }
}

/// Collaborators every session receives regardless of caller input.
#[derive(Clone)]
pub enum Global {
    Logger(RuleLogger),
    AppContext(Arc<AppContext>),
    Store(Arc<dyn RuleStore>),
}

impl fmt::Debug for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Global::Logger(l) => f.debug_tuple("Logger").field(l).finish(),
            Global::AppContext(c) => f.debug_tuple("AppContext").field(c).finish(),
            Global::Store(_) => f.write_str("Store(..)"),
        }
    }
}

/// Anything that can be inserted into an execution session.
#[derive(Debug, Clone)]
pub enum Fact {
    /// A typed instance bound from request parameters.
    Record(FactInstance),
    /// The raw request parameters.
    Params(Params),
    /// The mutable result accumulator for this invocation.
    Result(ResultHandle),
    /// An ambient collaborator.
    Global(Global),
}

impl Fact {
    /// Short label for logs and assertions.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Fact::Record(_) => "record",
            Fact::Params(_) => "params",
            Fact::Result(_) => "result",
            Fact::Global(Global::Logger(_)) => "logger",
            Fact::Global(Global::AppContext(_)) => "app_context",
            Fact::Global(Global::Store(_)) => "store",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_path_lookup() {
        let mut address = FactInstance::new("Address");
        address.set("city", FieldValue::Scalar(Value::from("Oslo")));
        let mut person = FactInstance::new("Person");
        person.set("age", FieldValue::Scalar(Value::Int(30)));
        person.set("address", FieldValue::Record(address));

        assert_eq!(person.get("age"), Some(&Value::Int(30)));
        assert_eq!(person.get_path("address.city"), Some(&Value::from("Oslo")));
        assert_eq!(person.get("address"), None);
        assert_eq!(person.get_path("address.zip"), None);
        assert_eq!(person.get_path("age.x"), None);
        assert_eq!(person.len(), 2);
    }

    #[test]
    fn fact_kinds() {
        assert_eq!(Fact::Params(Params::new()).kind(), "params");
        assert_eq!(Fact::Record(FactInstance::new("X")).kind(), "record");
        assert_eq!(
            Fact::Global(Global::Logger(RuleLogger::new("r"))).kind(),
            "logger"
        );
    }
}
