//! Mapping of untyped request parameters onto declared fact shapes.
//!
//! Binding is best effort. A value that cannot be coerced to its field's
//! declared type is skipped and reported as a [`BindDiagnostic`]; the field
//! keeps its default. Unknown keys are ignored.

use std::fmt;

use serde_json::Value as JsonValue;

use crate::engine::{Program, Session};
use crate::{
    Fact, FactGroup, FactInstance, FactShape, FieldType, FieldValue, Params, ResultHandle, Value,
    find_shape,
};

/// A parameter value that could not be bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindDiagnostic {
    /// Dotted path of the field, starting at the shape name.
    pub field: String,
    pub reason: String,
}

impl fmt::Display for BindDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// What a [`bind`] call inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindReport {
    /// Package whose shapes were instantiated, if any had rules.
    pub package: Option<String>,
    /// Number of typed fact instances inserted.
    pub facts: usize,
    pub diagnostics: Vec<BindDiagnostic>,
}

/// The declaration group whose shapes get bound: the first one with rules.
#[must_use]
pub fn active_group(groups: &[FactGroup]) -> Option<&FactGroup> {
    groups.iter().find(|g| g.has_rules)
}

/// Insert one typed instance per shape of the active group, then the raw
/// parameters and the result accumulator.
pub fn bind<P, S>(session: &mut S, program: &P, params: &Params, result: &ResultHandle) -> BindReport
where
    P: Program + ?Sized,
    S: Session + ?Sized,
{
    let groups = program.fact_groups();
    let mut report = BindReport::default();

    if let Some(group) = active_group(groups) {
        report.package = Some(group.package.clone());
        for shape in &group.shapes {
            let instance = instantiate(shape, groups, params, &mut report.diagnostics);
            session.insert(Fact::Record(instance));
            report.facts += 1;
        }
    }

    session.insert(Fact::Params(params.clone()));
    session.insert(Fact::Result(result.clone()));

    for diagnostic in &report.diagnostics {
        tracing::debug!(field = %diagnostic.field, "parameter not bound: {}", diagnostic.reason);
    }
    report
}

/// Build an instance of `shape` from `params`.
///
/// Scalar fields without a usable value get their type's default (`0`, `0.0`,
/// `false`, `""`); enum and nested fields stay unset.
pub fn instantiate(
    shape: &FactShape,
    groups: &[FactGroup],
    params: &Params,
    diagnostics: &mut Vec<BindDiagnostic>,
) -> FactInstance {
    instantiate_at(&shape.name, shape, groups, params, diagnostics)
}

fn instantiate_at(
    path: &str,
    shape: &FactShape,
    groups: &[FactGroup],
    params: &Params,
    diagnostics: &mut Vec<BindDiagnostic>,
) -> FactInstance {
    let mut instance = FactInstance::new(&shape.name);

    for decl in &shape.fields {
        let field_path = format!("{path}.{}", decl.name);
        let bound = match params.get(&decl.name) {
            None => None,
            Some(raw) => match coerce(raw, &decl.ty, &field_path, groups, diagnostics) {
                Ok(value) => Some(value),
                Err(reason) => {
                    diagnostics.push(BindDiagnostic {
                        field: field_path,
                        reason,
                    });
                    None
                }
            },
        };
        if let Some(value) = bound.or_else(|| default_for(&decl.ty)) {
            instance.set(decl.name.clone(), value);
        }
    }

    instance
}

fn default_for(ty: &FieldType) -> Option<FieldValue> {
    let value = match ty {
        FieldType::Int => Value::Int(0),
        FieldType::Float => Value::Float(0.0),
        FieldType::Bool => Value::Bool(false),
        FieldType::String => Value::String(String::new()),
        FieldType::Enum(_) | FieldType::Shape(_) => return None,
    };
    Some(FieldValue::Scalar(value))
}

fn coerce(
    raw: &JsonValue,
    ty: &FieldType,
    path: &str,
    groups: &[FactGroup],
    diagnostics: &mut Vec<BindDiagnostic>,
) -> Result<FieldValue, String> {
    let scalar = match (ty, raw) {
        (FieldType::Shape(name), JsonValue::Object(map)) => {
            let shape = find_shape(groups, name).ok_or_else(|| format!("unknown type {name}"))?;
            return Ok(FieldValue::Record(instantiate_at(
                path,
                shape,
                groups,
                map,
                diagnostics,
            )));
        }
        (_, JsonValue::Null) => return Err("null value".into()),
        (FieldType::Int, raw) => coerce_int(raw),
        (FieldType::Float, raw) => coerce_float(raw),
        (FieldType::Bool, JsonValue::Bool(b)) => Some(Value::Bool(*b)),
        (FieldType::Bool, JsonValue::String(s)) => s.trim().parse().ok().map(Value::Bool),
        (FieldType::String, JsonValue::String(s)) => Some(Value::String(s.clone())),
        (FieldType::String, raw @ (JsonValue::Number(_) | JsonValue::Bool(_))) => {
            Some(Value::String(raw.to_string()))
        }
        (FieldType::Enum(variants), JsonValue::String(s)) => {
            if variants.iter().any(|v| v == s) {
                Some(Value::String(s.clone()))
            } else {
                return Err(format!("{s:?} is not one of {}", variants.join(", ")));
            }
        }
        _ => None,
    };
    scalar
        .map(FieldValue::Scalar)
        .ok_or_else(|| format!("cannot convert {} to {ty}", json_kind(raw)))
}

fn coerce_int(raw: &JsonValue) -> Option<Value> {
    match raw {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
    .map(Value::Int)
}

/// Integral floats within `i64` range, e.g. `30.0`.
#[allow(clippy::cast_possible_truncation)]
fn integral(f: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    (f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then(|| f as i64)
}

fn coerce_float(raw: &JsonValue) -> Option<Value> {
    match raw {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
    .map(Value::Float)
}

fn json_kind(raw: &JsonValue) -> &'static str {
    match raw {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::FieldDecl;

    fn decl(name: &str, ty: FieldType) -> FieldDecl {
        FieldDecl {
            name: name.into(),
            ty,
        }
    }

    fn groups() -> Vec<FactGroup> {
        vec![FactGroup {
            package: "loans".into(),
            shapes: vec![
                FactShape {
                    name: "Applicant".into(),
                    fields: vec![
                        decl("age", FieldType::Int),
                        decl("name", FieldType::String),
                        decl("income", FieldType::Float),
                        decl("vip", FieldType::Bool),
                        decl("tier", FieldType::Enum(vec!["GOLD".into(), "SILVER".into()])),
                        decl("home", FieldType::Shape("Address".into())),
                    ],
                },
                FactShape {
                    name: "Address".into(),
                    fields: vec![decl("city", FieldType::String)],
                },
            ],
            has_rules: true,
        }]
    }

    fn params(json: JsonValue) -> Params {
        match json {
            JsonValue::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn applicant(json: JsonValue) -> (FactInstance, Vec<BindDiagnostic>) {
        let groups = groups();
        let mut diagnostics = Vec::new();
        let instance = instantiate(&groups[0].shapes[0], &groups, &params(json), &mut diagnostics);
        (instance, diagnostics)
    }

    #[test]
    fn matching_keys_bind_and_extra_keys_are_ignored() {
        let (instance, diagnostics) = applicant(json!({"age": 30, "name": "bob", "extra": "x"}));
        assert_eq!(instance.get("age"), Some(&Value::Int(30)));
        assert_eq!(instance.get("name"), Some(&Value::from("bob")));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unmatched_fields_take_defaults() {
        let (instance, _) = applicant(json!({}));
        assert_eq!(instance.get("age"), Some(&Value::Int(0)));
        assert_eq!(instance.get("income"), Some(&Value::Float(0.0)));
        assert_eq!(instance.get("vip"), Some(&Value::Bool(false)));
        assert_eq!(instance.get("name"), Some(&Value::from("")));
        assert_eq!(instance.get("tier"), None);
        assert_eq!(instance.record("home"), None);
    }

    #[test]
    fn numeric_widening_and_string_parsing() {
        let (instance, diagnostics) =
            applicant(json!({"age": "41", "income": 1200, "vip": "true", "name": 7}));
        assert_eq!(instance.get("age"), Some(&Value::Int(41)));
        assert_eq!(instance.get("income"), Some(&Value::Float(1200.0)));
        assert_eq!(instance.get("vip"), Some(&Value::Bool(true)));
        assert_eq!(instance.get("name"), Some(&Value::from("7")));
        assert!(diagnostics.is_empty());

        let (instance, _) = applicant(json!({"age": 30.0}));
        assert_eq!(instance.get("age"), Some(&Value::Int(30)));
    }

    #[test]
    fn uncoercible_values_are_reported_and_defaulted() {
        let (instance, diagnostics) =
            applicant(json!({"age": 30.5, "vip": [true], "income": null, "tier": "BRONZE"}));
        assert_eq!(instance.get("age"), Some(&Value::Int(0)));
        assert_eq!(instance.get("vip"), Some(&Value::Bool(false)));
        assert_eq!(instance.get("tier"), None);
        let fields: Vec<&str> = diagnostics.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(
            fields,
            ["Applicant.age", "Applicant.income", "Applicant.vip", "Applicant.tier"]
        );
        assert_eq!(
            diagnostics[0].to_string(),
            "Applicant.age: cannot convert number to int"
        );
    }

    #[test]
    fn enum_accepts_known_variant() {
        let (instance, diagnostics) = applicant(json!({"tier": "GOLD"}));
        assert_eq!(instance.get("tier"), Some(&Value::from("GOLD")));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn nested_objects_map_recursively() {
        let (instance, diagnostics) =
            applicant(json!({"home": {"city": "Lima", "zip": 1, "bogus": null}}));
        assert_eq!(instance.get_path("home.city"), Some(&Value::from("Lima")));
        assert!(diagnostics.is_empty());

        let (_, diagnostics) = applicant(json!({"home": {"city": {"deep": 1}}}));
        assert_eq!(diagnostics[0].field, "Applicant.home.city");
    }

    #[test]
    fn nested_scalar_is_rejected() {
        let (instance, diagnostics) = applicant(json!({"home": "Lima"}));
        assert_eq!(instance.record("home"), None);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn active_group_is_first_with_rules() {
        let mut groups = groups();
        groups.insert(
            0,
            FactGroup {
                package: "shared".into(),
                shapes: vec![],
                has_rules: false,
            },
        );
        assert_eq!(active_group(&groups).map(|g| g.package.as_str()), Some("loans"));
        groups[1].has_rules = false;
        assert!(active_group(&groups).is_none());
    }
}
