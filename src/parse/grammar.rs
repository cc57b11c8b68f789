use winnow::ascii::{dec_int, multispace1, space1, till_line_ending};
use winnow::combinator::{alt, cut_err, delimited, not, opt, preceded, repeat, separated, terminated};
use winnow::error::{ContextError, ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use crate::{Action, CompareOp, Expr, FactShape, FieldDecl, FieldType, Operand, Rule, Value};

use super::parser::{DEFAULT_PACKAGE, ParsedPackage, ParsedProgram};

// -- Whitespace & comments --------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
            ('#', till_line_ending).void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

fn expected(what: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(what))
}

// -- Identifiers ------------------------------------------------------------

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| {
            c.is_ascii_alphanumeric() || c == '_' || c == '.'
        }),
    )
        .take()
        .parse_next(input)
}

/// A keyword that is not the prefix of a longer identifier (`NOT` but not `NOTE`).
fn keyword<'i>(
    upper: &'static str,
    lower: &'static str,
) -> impl Parser<&'i str, &'i str, ErrMode<ContextError>> {
    terminated(
        alt((upper, lower)),
        not(take_while(1, |c: char| {
            c.is_ascii_alphanumeric() || c == '_' || c == '.'
        })),
    )
}

// -- Values -----------------------------------------------------------------

fn string_literal(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = any.parse_next(input)?;
        match ch {
            '"' => return Ok(s),
            '\\' => {
                let esc = any.parse_next(input)?;
                match esc {
                    '"' => s.push('"'),
                    '\\' => s.push('\\'),
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            c => s.push(c),
        }
    }
}

fn negative_number(input: &mut &str) -> ModalResult<Value> {
    let neg_str = (
        '-',
        take_while(1.., |c: char| c.is_ascii_digit() || c == '.'),
    )
        .take()
        .parse_next(input)?;
    if neg_str.contains('.') {
        let f: f64 = neg_str
            .parse()
            .map_err(|_| ErrMode::from_input(input).cut())?;
        Ok(Value::Float(f))
    } else {
        let i: i64 = neg_str
            .parse()
            .map_err(|_| ErrMode::from_input(input).cut())?;
        Ok(Value::Int(i))
    }
}

fn float_literal(input: &mut &str) -> ModalResult<f64> {
    (
        take_while(1.., |c: char| c.is_ascii_digit()),
        '.',
        take_while(1.., |c: char| c.is_ascii_digit()),
    )
        .take()
        .try_map(|s: &str| s.parse::<f64>())
        .parse_next(input)
}

fn value(input: &mut &str) -> ModalResult<Value> {
    ws.parse_next(input)?;
    alt((
        string_literal.map(Value::String),
        "true".value(Value::Bool(true)),
        "false".value(Value::Bool(false)),
        negative_number,
        float_literal.map(Value::Float),
        dec_int::<_, i64, _>.map(Value::Int),
    ))
    .context(expected("value"))
    .parse_next(input)
}

// -- Comparison operators ---------------------------------------------------

fn compare_op(input: &mut &str) -> ModalResult<CompareOp> {
    ws.parse_next(input)?;
    alt((
        ">=".value(CompareOp::Gte),
        ">".value(CompareOp::Gt),
        "<=".value(CompareOp::Lte),
        "<".value(CompareOp::Lt),
        "==".value(CompareOp::Eq),
        "!=".value(CompareOp::Neq),
    ))
    .parse_next(input)
}

// -- Expressions (precedence: OR < AND < NOT < primary) ---------------------

fn primary(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    alt((delimited('(', expr, (ws, ')')), comparison_or_rule_ref))
        .context(expected("expression"))
        .parse_next(input)
}

fn comparison_or_rule_ref(input: &mut &str) -> ModalResult<Expr> {
    let name = ident.parse_next(input)?;
    let checkpoint = input.checkpoint();
    ws.parse_next(input)?;
    if let Ok(op) = compare_op.parse_next(input) {
        let val = cut_err(value).parse_next(input)?;
        Ok(Expr::Compare {
            field: name.to_owned(),
            op,
            value: val,
        })
    } else {
        input.reset(&checkpoint);
        Ok(Expr::RuleRef(name.to_owned()))
    }
}

fn unary(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    if opt(keyword("NOT", "not")).parse_next(input)?.is_some() {
        let inner = cut_err(unary).parse_next(input)?;
        Ok(Expr::Not(Box::new(inner)))
    } else {
        primary(input)
    }
}

fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = unary(input)?;
    let rest: Vec<Expr> =
        repeat(0.., preceded((ws, keyword("AND", "and")), cut_err(unary))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, r| Expr::And(Box::new(acc), Box::new(r))))
}

fn or_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = and_expr(input)?;
    let rest: Vec<Expr> =
        repeat(0.., preceded((ws, keyword("OR", "or")), cut_err(and_expr))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, r| Expr::Or(Box::new(acc), Box::new(r))))
}

fn expr(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    or_expr(input)
}

// -- Actions ----------------------------------------------------------------

fn operand(input: &mut &str) -> ModalResult<Operand> {
    ws.parse_next(input)?;
    alt((
        value.map(Operand::Literal),
        ident.map(|path: &str| Operand::Field(path.to_owned())),
    ))
    .context(expected("value or field path"))
    .parse_next(input)
}

fn set_action(input: &mut &str) -> ModalResult<Action> {
    ("set", space1).parse_next(input)?;
    let key = cut_err(ident)
        .context(expected("result key"))
        .parse_next(input)?;
    ws.parse_next(input)?;
    cut_err('=').parse_next(input)?;
    let value = cut_err(operand).parse_next(input)?;
    Ok(Action::Set {
        key: key.to_owned(),
        value,
    })
}

fn fail_action(input: &mut &str) -> ModalResult<Action> {
    ("fail", space1).parse_next(input)?;
    let message = cut_err(string_literal)
        .context(expected("failure message"))
        .parse_next(input)?;
    Ok(Action::Fail { message })
}

fn log_action(input: &mut &str) -> ModalResult<Action> {
    ("log", space1).parse_next(input)?;
    let message = cut_err(string_literal)
        .context(expected("log message"))
        .parse_next(input)?;
    Ok(Action::Log { message })
}

fn action(input: &mut &str) -> ModalResult<Action> {
    ws.parse_next(input)?;
    alt((set_action, fail_action, log_action)).parse_next(input)
}

// -- Fact type declarations -------------------------------------------------

fn enum_type(input: &mut &str) -> ModalResult<FieldType> {
    ("enum", ws, '(').parse_next(input)?;
    let variants: Vec<&str> = cut_err(separated(1.., delimited(ws, ident, ws), ','))
        .context(expected("enum variants"))
        .parse_next(input)?;
    cut_err(')').parse_next(input)?;
    Ok(FieldType::Enum(
        variants.into_iter().map(str::to_owned).collect(),
    ))
}

fn field_type(input: &mut &str) -> ModalResult<FieldType> {
    ws.parse_next(input)?;
    alt((enum_type, ident.map(FieldType::from_name)))
        .context(expected("field type"))
        .parse_next(input)
}

fn field_decl(input: &mut &str) -> ModalResult<FieldDecl> {
    ws.parse_next(input)?;
    let name = ident.parse_next(input)?;
    ws.parse_next(input)?;
    ':'.parse_next(input)?;
    let ty = cut_err(field_type).parse_next(input)?;
    Ok(FieldDecl {
        name: name.to_owned(),
        ty,
    })
}

// -- Top-level items --------------------------------------------------------

enum Item {
    Package(String),
    Shape(FactShape),
    Rule(Rule),
}

fn package_decl(input: &mut &str) -> ModalResult<Item> {
    ws.parse_next(input)?;
    ("package", space1).parse_next(input)?;
    let name = cut_err(ident)
        .context(expected("package name"))
        .parse_next(input)?;
    Ok(Item::Package(name.to_owned()))
}

fn declare_def(input: &mut &str) -> ModalResult<Item> {
    ws.parse_next(input)?;
    ("declare", space1).parse_next(input)?;
    let name = cut_err(ident)
        .context(expected("fact type name"))
        .parse_next(input)?;
    let fields: Vec<FieldDecl> = repeat(0.., field_decl).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err("end")
        .context(expected("field or 'end'"))
        .parse_next(input)?;
    Ok(Item::Shape(FactShape {
        name: name.to_owned(),
        fields,
    }))
}

fn priority_annotation(input: &mut &str) -> ModalResult<u32> {
    let n: i64 = delimited(
        (ws, '(', ws, "priority", ws),
        cut_err(dec_int::<_, i64, _>),
        (ws, cut_err(')')),
    )
    .parse_next(input)?;
    u32::try_from(n).map_err(|_| ErrMode::from_input(input).cut())
}

fn rule_def(input: &mut &str) -> ModalResult<Item> {
    ws.parse_next(input)?;
    ("rule", space1).parse_next(input)?;

    let name = cut_err(ident)
        .context(expected("rule name"))
        .parse_next(input)?;

    let priority = opt(priority_annotation).parse_next(input)?;

    ws.parse_next(input)?;
    cut_err(':').parse_next(input)?;

    let condition = cut_err(expr)
        .context(expected("rule body"))
        .parse_next(input)?;

    let actions: Option<Vec<Action>> = opt(preceded(
        (ws, "then", multispace1),
        cut_err(repeat(1.., action)).context(expected("action")),
    ))
    .parse_next(input)?;

    Ok(Item::Rule(Rule {
        name: name.to_owned(),
        condition,
        priority,
        actions: actions.unwrap_or_default(),
    }))
}

pub fn parse_program(input: &mut &str) -> ModalResult<ParsedProgram> {
    let items: Vec<Item> =
        repeat(0.., alt((package_decl, declare_def, rule_def))).parse_next(input)?;
    ws.parse_next(input)?;

    let mut packages = Vec::new();
    let mut current = ParsedPackage::named(DEFAULT_PACKAGE);
    for item in items {
        match item {
            Item::Package(name) => {
                if !current.is_empty() {
                    packages.push(current);
                }
                current = ParsedPackage::named(name);
            }
            Item::Shape(shape) => current.shapes.push(shape),
            Item::Rule(rule) => current.rules.push(rule),
        }
    }
    if !current.is_empty() || packages.is_empty() {
        packages.push(current);
    }

    Ok(ParsedProgram { packages })
}

#[cfg(test)]
mod tests {
    use crate::parse::parse;

    use super::*;

    fn only_rule(input: &str) -> Rule {
        let parsed = parse(input).unwrap();
        parsed.rules().next().cloned().unwrap()
    }

    #[test]
    fn parse_single_field_rule() {
        let rule = only_rule("rule age_check:\n    Applicant.age >= 18");
        assert_eq!(rule.name, "age_check");
        assert_eq!(rule.priority, None);
        assert!(rule.actions.is_empty());
    }

    #[test]
    fn parse_priority() {
        let rule = only_rule("rule allow (priority 10):\n    x >= 18");
        assert_eq!(rule.priority, Some(10));
    }

    #[test]
    fn parse_precedence_and_before_or() {
        let rule = only_rule("rule r:\n    a OR b AND c");
        match rule.condition {
            Expr::Or(left, right) => {
                assert!(matches!(left.as_ref(), Expr::RuleRef(n) if n == "a"));
                assert!(matches!(right.as_ref(), Expr::And(_, _)));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn parse_parenthesized_grouping() {
        let rule = only_rule("rule r:\n    (a OR b) AND NOT c");
        match rule.condition {
            Expr::And(left, right) => {
                assert!(matches!(left.as_ref(), Expr::Or(_, _)));
                assert!(matches!(right.as_ref(), Expr::Not(_)));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn parse_all_value_types() {
        let cases = [
            ("42", Value::Int(42)),
            ("-5", Value::Int(-5)),
            ("3.5", Value::Float(3.5)),
            ("true", Value::Bool(true)),
            (r#""a\"b""#, Value::String("a\"b".into())),
        ];
        for (literal, expected) in cases {
            let rule = only_rule(&format!("rule r:\n    x == {literal}"));
            match rule.condition {
                Expr::Compare { value, .. } => assert_eq!(value, expected, "failed for {literal}"),
                other => panic!("expected Compare for {literal}, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_actions() {
        let rule = only_rule(
            "rule approve (priority 1):\n    Applicant.age >= 18\n  then\n    set decision = \"approve\"\n    set who = Applicant.name\n    log \"approved\"\n    fail \"manual review\"",
        );
        assert_eq!(
            rule.actions,
            vec![
                Action::Set {
                    key: "decision".into(),
                    value: Operand::Literal(Value::String("approve".into())),
                },
                Action::Set {
                    key: "who".into(),
                    value: Operand::Field("Applicant.name".into()),
                },
                Action::Log {
                    message: "approved".into()
                },
                Action::Fail {
                    message: "manual review".into()
                },
            ]
        );
    }

    #[test]
    fn parse_declaration() {
        let parsed = parse(
            "declare Applicant\n    age: int\n    score: double\n    tier: enum(GOLD, SILVER)\n    home: Address\nend",
        )
        .unwrap();
        let shape = parsed.shapes().next().unwrap();
        assert_eq!(shape.name, "Applicant");
        assert_eq!(shape.fields.len(), 4);
        assert_eq!(shape.fields[1].ty, FieldType::Float);
        assert_eq!(
            shape.fields[2].ty,
            FieldType::Enum(vec!["GOLD".into(), "SILVER".into()])
        );
        assert_eq!(shape.fields[3].ty, FieldType::Shape("Address".into()));
    }

    #[test]
    fn items_before_package_go_to_default_group() {
        let parsed = parse(
            "declare A\n  x: int\nend\npackage loans\nrule r:\n  A.x == 1\npackage empty\n",
        )
        .unwrap();
        assert_eq!(parsed.packages.len(), 2);
        assert_eq!(parsed.packages[0].name, DEFAULT_PACKAGE);
        assert_eq!(parsed.packages[0].shapes.len(), 1);
        assert_eq!(parsed.packages[1].name, "loans");
        assert_eq!(parsed.packages[1].rules.len(), 1);
    }

    #[test]
    fn parse_empty_input() {
        let parsed = parse("  # nothing here\n").unwrap();
        assert_eq!(parsed.packages.len(), 1);
        assert!(parsed.packages[0].is_empty());
    }

    #[test]
    fn missing_end_is_an_error() {
        assert!(parse("declare A\n  x: int\n").is_err());
    }

    #[test]
    fn then_without_action_is_an_error() {
        assert!(parse("rule r:\n  x == 1\nthen\n").is_err());
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        assert!(parse("rule r:\n  x == 1\n}}}").is_err());
    }

    #[test]
    fn keywords_do_not_swallow_identifiers() {
        let rule = only_rule("rule r:\n    notify AND order OR android");
        match rule.condition {
            Expr::Or(left, right) => {
                assert!(matches!(right.as_ref(), Expr::RuleRef(n) if n == "android"));
                match left.as_ref() {
                    Expr::And(a, b) => {
                        assert!(matches!(a.as_ref(), Expr::RuleRef(n) if n == "notify"));
                        assert!(matches!(b.as_ref(), Expr::RuleRef(n) if n == "order"));
                    }
                    other => panic!("expected And, got {other:?}"),
                }
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }
}
