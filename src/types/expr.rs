use std::fmt;

use super::Value;

/// Comparison operators supported in rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Condition AST. Field paths and rule names stay as strings; the compiler
/// validates them against the declared shapes and the rule table.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    RuleRef(String),
}

impl Expr {
    /// Names of all rules this expression references, in source order.
    #[must_use]
    pub fn rule_refs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.visit(&mut |e| {
            if let Expr::RuleRef(name) = e {
                out.push(name.as_str());
            }
        });
        out
    }

    /// All `(field, literal)` comparisons in this expression, in source order.
    #[must_use]
    pub fn comparisons(&self) -> Vec<(&str, &Value)> {
        let mut out = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Compare { field, value, .. } = e {
                out.push((field.as_str(), value));
            }
        });
        out
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Expr::Not(inner) => inner.visit(f),
            Expr::Compare { .. } | Expr::RuleRef(_) => {}
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Neq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Compare { field, op, value } => write!(f, "({field} {op} {value})"),
            Expr::And(a, b) => write!(f, "({a} AND {b})"),
            Expr::Or(a, b) => write!(f, "({a} OR {b})"),
            Expr::Not(inner) => write!(f, "(NOT {inner})"),
            Expr::RuleRef(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(field: &str, value: i64) -> Expr {
        Expr::Compare {
            field: field.to_owned(),
            op: CompareOp::Gte,
            value: Value::Int(value),
        }
    }

    #[test]
    fn display_nested() {
        let expr = Expr::And(
            Box::new(cmp("Applicant.age", 18)),
            Box::new(Expr::Not(Box::new(Expr::RuleRef("banned".into())))),
        );
        assert_eq!(
            expr.to_string(),
            "((Applicant.age >= 18) AND (NOT banned))"
        );
    }

    #[test]
    fn collects_rule_refs_in_order() {
        let expr = Expr::Or(
            Box::new(Expr::RuleRef("a".into())),
            Box::new(Expr::And(
                Box::new(cmp("x", 1)),
                Box::new(Expr::RuleRef("b".into())),
            )),
        );
        assert_eq!(expr.rule_refs(), vec!["a", "b"]);
    }

    #[test]
    fn collects_comparisons() {
        let expr = Expr::And(Box::new(cmp("x", 1)), Box::new(cmp("y", 2)));
        let found = expr.comparisons();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], ("x", &Value::Int(1)));
        assert_eq!(found[1], ("y", &Value::Int(2)));
    }
}
