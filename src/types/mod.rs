mod error;
mod expr;
pub(crate) mod fact;
mod memory;
mod program;
mod result;
mod rule;
mod shape;
mod value;

pub use error::CompileError;
pub use expr::{CompareOp, Expr};
pub use fact::{AppContext, Fact, FactInstance, FieldValue, Global, Params, RuleLogger};
pub use memory::WorkingMemory;
pub use program::RuleProgram;
pub use result::{ExecutionResult, ResultHandle};
pub(crate) use rule::CompiledRule;
pub use rule::{Action, Operand, Rule};
pub use shape::{FactGroup, FactShape, FieldDecl, FieldType, find_shape};
pub use value::Value;
