use std::time::Instant;

use serde_json::Value as JsonValue;

use crate::engine::FireError;
use crate::types::CompiledRule;
use crate::{Action, Expr, Operand, ResultHandle, RuleLogger, RuleProgram, Value, WorkingMemory};

/// One firing pass: evaluate every rule in topological order, then run the
/// actions of every activation in agenda order. Returns the number of activations.
pub(crate) fn fire(
    program: &RuleProgram,
    memory: &WorkingMemory,
    result: Option<&ResultHandle>,
    logger: Option<&RuleLogger>,
    deadline: Option<Instant>,
) -> Result<usize, FireError> {
    let mut results = vec![false; program.rules.len()];

    for rule in &program.rules {
        check_deadline(deadline, 0)?;
        results[rule.index] = eval_expr(&rule.condition, memory, &results, program);
    }

    let mut fired = 0;
    for &idx in &program.agenda {
        if !results[idx] {
            continue;
        }
        check_deadline(deadline, fired)?;
        let rule = &program.rules[idx];
        for action in &rule.actions {
            run_action(rule, action, memory, result, logger)?;
        }
        fired += 1;
    }

    Ok(fired)
}

fn check_deadline(deadline: Option<Instant>, fired: usize) -> Result<(), FireError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(FireError::DeadlineExceeded { fired }),
        _ => Ok(()),
    }
}

fn run_action(
    rule: &CompiledRule,
    action: &Action,
    memory: &WorkingMemory,
    result: Option<&ResultHandle>,
    logger: Option<&RuleLogger>,
) -> Result<(), FireError> {
    match action {
        Action::Set { key, value } => {
            let value = match value {
                Operand::Literal(v) => Some(JsonValue::from(v)),
                Operand::Field(path) => memory.get(path).map(JsonValue::from),
            };
            if let Some(value) = value {
                result_of(rule, result)?.update(|r| r.put(key.clone(), value));
            }
        }
        Action::Fail { message } => {
            result_of(rule, result)?.update(|r| r.fail(message.clone()));
        }
        Action::Log { message } => match logger {
            Some(logger) => logger.info(&rule.name, message),
            None => tracing::debug!(rule = %rule.name, "no logger fact, dropped: {message}"),
        },
    }
    Ok(())
}

fn result_of<'a>(
    rule: &CompiledRule,
    result: Option<&'a ResultHandle>,
) -> Result<&'a ResultHandle, FireError> {
    result.ok_or_else(|| FireError::Rule {
        rule: rule.name.clone(),
        message: "no result fact in session".into(),
    })
}

fn eval_expr(expr: &Expr, memory: &WorkingMemory, results: &[bool], program: &RuleProgram) -> bool {
    match expr {
        Expr::Compare { field, op, value } => memory
            .get(field)
            .and_then(|actual: &Value| actual.compare(*op, value))
            .unwrap_or(false),
        Expr::And(a, b) => {
            eval_expr(a, memory, results, program) && eval_expr(b, memory, results, program)
        }
        Expr::Or(a, b) => {
            eval_expr(a, memory, results, program) || eval_expr(b, memory, results, program)
        }
        Expr::Not(inner) => !eval_expr(inner, memory, results, program),
        Expr::RuleRef(name) => program
            .rule_indices
            .get(name.as_str())
            .is_some_and(|&idx| results[idx]),
    }
}
