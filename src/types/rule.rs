use std::fmt;

use super::Value;
use super::expr::Expr;

/// A named rule: a condition plus the actions it runs when the condition holds.
///
/// Rules without actions act as named sub-conditions that other rules
/// reference by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub condition: Expr,
    /// Lower values run first. `None` runs after every prioritized rule.
    pub priority: Option<u32>,
    pub actions: Vec<Action>,
}

/// Effect of a fired rule on the session's result accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Put `key` into the result payload object.
    Set { key: String, value: Operand },
    /// Mark the result failed with a message.
    Fail { message: String },
    /// Emit a message through the session's logger fact.
    Log { message: String },
}

/// Right-hand side of a `set` action.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Field(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Set { key, value } => write!(f, "set {key} = {value}"),
            Action::Fail { message } => write!(f, "fail {message:?}"),
            Action::Log { message } => write!(f, "log {message:?}"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(v) => write!(f, "{v}"),
            Operand::Field(path) => write!(f, "{path}"),
        }
    }
}

/// A rule placed in topological (dependency) order.
///
/// Produced by the compilation step and stored inside a
/// [`RuleProgram`](super::RuleProgram). `index` is the rule's position in
/// evaluation order, `declared` its position in the source text.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub(crate) name: String,
    pub(crate) condition: Expr,
    pub(crate) actions: Vec<Action>,
    pub(crate) priority: Option<u32>,
    pub(crate) index: usize,
    pub(crate) declared: usize,
}

impl CompiledRule {
    /// Agenda ordering key: priority first, then declaration order.
    pub(crate) fn salience(&self) -> (u32, usize) {
        (self.priority.unwrap_or(u32::MAX), self.declared)
    }
}
