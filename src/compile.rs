use std::collections::{HashMap, HashSet, VecDeque};

use crate::parse::ParsedProgram;
use crate::{
    Action, CompileError, CompiledRule, FactGroup, FactShape, FieldType, Operand, Rule,
    RuleProgram, Value,
};

/// Validate a parsed program and lower it into an executable [`RuleProgram`].
///
/// Every check runs even after an earlier one failed, so the caller gets the
/// complete list of problems.
pub(crate) fn compile(parsed: &ParsedProgram, source: &str) -> Result<RuleProgram, Vec<CompileError>> {
    let mut errors = Vec::new();

    let shapes = collect_shapes(parsed, &mut errors);
    check_field_types(&shapes, &mut errors);

    let rules: Vec<&Rule> = parsed.rules().collect();
    let has_duplicates = check_duplicates(&rules, &mut errors);
    let rule_map: HashMap<&str, &Rule> = rules.iter().map(|r| (r.name.as_str(), *r)).collect();

    check_references(&rules, &rule_map, &mut errors);
    check_fields(&rules, &shapes, &mut errors);

    let sorted = if has_duplicates {
        None
    } else {
        match topological_sort(&rules, &rule_map) {
            Ok(sorted) => Some(sorted),
            Err(err) => {
                errors.push(err);
                None
            }
        }
    };

    let sorted = match sorted {
        Some(sorted) if errors.is_empty() => sorted,
        _ => return Err(errors),
    };

    let declared: HashMap<&str, usize> = rules
        .iter()
        .enumerate()
        .map(|(i, r)| (r.name.as_str(), i))
        .collect();

    let compiled_rules: Vec<CompiledRule> = sorted
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let rule = rule_map[name.as_str()];
            CompiledRule {
                name: rule.name.clone(),
                condition: rule.condition.clone(),
                actions: rule.actions.clone(),
                priority: rule.priority,
                index: i,
                declared: declared[name.as_str()],
            }
        })
        .collect();

    let rule_indices: HashMap<String, usize> = compiled_rules
        .iter()
        .map(|r| (r.name.clone(), r.index))
        .collect();

    let mut agenda: Vec<usize> = compiled_rules
        .iter()
        .filter(|r| !r.actions.is_empty())
        .map(|r| r.index)
        .collect();
    agenda.sort_by_key(|&i| compiled_rules[i].salience());

    let groups = parsed
        .packages
        .iter()
        .map(|p| FactGroup {
            package: p.name.clone(),
            shapes: p.shapes.clone(),
            has_rules: !p.rules.is_empty(),
        })
        .collect();

    Ok(RuleProgram {
        rules: compiled_rules,
        rule_indices,
        agenda,
        groups,
        digest: blake3::hash(source.as_bytes()),
    })
}

fn collect_shapes<'a>(
    parsed: &'a ParsedProgram,
    errors: &mut Vec<CompileError>,
) -> HashMap<&'a str, &'a FactShape> {
    let mut shapes = HashMap::new();
    for shape in parsed.shapes() {
        if DYNAMIC_ROOTS.contains(&shape.name.as_str()) {
            errors.push(CompileError::ReservedShapeName {
                name: shape.name.clone(),
            });
            continue;
        }
        if shapes.insert(shape.name.as_str(), shape).is_some() {
            errors.push(CompileError::DuplicateShape {
                name: shape.name.clone(),
            });
        }
    }
    shapes
}

fn check_field_types(shapes: &HashMap<&str, &FactShape>, errors: &mut Vec<CompileError>) {
    let mut ordered: Vec<&FactShape> = shapes.values().copied().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    for shape in ordered {
        let mut seen = HashSet::new();
        for field in &shape.fields {
            if !seen.insert(field.name.as_str()) {
                errors.push(CompileError::DuplicateField {
                    shape: shape.name.clone(),
                    field: field.name.clone(),
                });
            }
            if let FieldType::Shape(target) = &field.ty
                && !shapes.contains_key(target.as_str())
            {
                errors.push(CompileError::UnknownType {
                    shape: shape.name.clone(),
                    field: field.name.clone(),
                    ty: target.clone(),
                });
            }
        }
    }
}

fn check_duplicates(rules: &[&Rule], errors: &mut Vec<CompileError>) -> bool {
    let mut seen = HashSet::new();
    let mut found = false;
    for rule in rules {
        if !seen.insert(&rule.name) {
            errors.push(CompileError::DuplicateRule {
                name: rule.name.clone(),
            });
            found = true;
        }
    }
    found
}

fn check_references(rules: &[&Rule], rule_map: &HashMap<&str, &Rule>, errors: &mut Vec<CompileError>) {
    for rule in rules {
        for reference in rule.condition.rule_refs() {
            if !rule_map.contains_key(reference) {
                errors.push(CompileError::UndefinedRuleRef {
                    rule: rule.name.clone(),
                    reference: reference.to_owned(),
                });
            }
        }
    }
}

fn check_fields(rules: &[&Rule], shapes: &HashMap<&str, &FactShape>, errors: &mut Vec<CompileError>) {
    for rule in rules {
        for (field, literal) in rule.condition.comparisons() {
            match resolve_path(field, shapes) {
                Ok(Some(ty)) => check_literal(&rule.name, field, ty, literal, errors),
                Ok(None) => {}
                Err(()) => errors.push(undefined_field(&rule.name, field)),
            }
        }
        for action in &rule.actions {
            if let Action::Set {
                value: Operand::Field(path),
                ..
            } = action
                && resolve_path(path, shapes).is_err()
            {
                errors.push(undefined_field(&rule.name, path));
            }
        }
    }
}

fn undefined_field(rule: &str, field: &str) -> CompileError {
    CompileError::UndefinedField {
        rule: rule.to_owned(),
        field: field.to_owned(),
    }
}

/// Roots that are not declared shapes but are always present in working memory.
const DYNAMIC_ROOTS: [&str; 2] = ["params", "context"];

/// Resolve a field path to the scalar type it reads.
///
/// `Ok(None)` means the path is valid but untyped (dynamic roots, or a path
/// through a shape whose declaration is itself broken).
fn resolve_path<'a>(
    path: &str,
    shapes: &HashMap<&str, &'a FactShape>,
) -> Result<Option<&'a FieldType>, ()> {
    let mut segments = path.split('.');
    let root = segments.next().ok_or(())?;
    let rest: Vec<&str> = segments.collect();

    if DYNAMIC_ROOTS.contains(&root) {
        return if rest.is_empty() { Err(()) } else { Ok(None) };
    }

    let mut shape = *shapes.get(root).ok_or(())?;
    let Some((last, parents)) = rest.split_last() else {
        return Err(());
    };
    for segment in parents {
        match &shape.field(segment).ok_or(())?.ty {
            FieldType::Shape(target) => match shapes.get(target.as_str()) {
                Some(next) => shape = *next,
                None => return Ok(None),
            },
            _ => return Err(()),
        }
    }
    let ty = &shape.field(last).ok_or(())?.ty;
    if ty.is_scalar() { Ok(Some(ty)) } else { Err(()) }
}

fn check_literal(
    rule: &str,
    field: &str,
    ty: &FieldType,
    literal: &Value,
    errors: &mut Vec<CompileError>,
) {
    let compatible = match (ty, literal) {
        (FieldType::Int | FieldType::Float, Value::Int(_) | Value::Float(_))
        | (FieldType::Bool, Value::Bool(_))
        | (FieldType::String, Value::String(_)) => true,
        (FieldType::Enum(variants), Value::String(s)) => {
            if !variants.iter().any(|v| v == s) {
                errors.push(CompileError::UnknownVariant {
                    rule: rule.to_owned(),
                    field: field.to_owned(),
                    variant: s.clone(),
                });
            }
            true
        }
        _ => false,
    };
    if !compatible {
        errors.push(CompileError::TypeMismatch {
            rule: rule.to_owned(),
            field: field.to_owned(),
            expected: ty.to_string(),
            found: literal.type_name().to_owned(),
        });
    }
}

/// Kahn's algorithm for topological sort with cycle detection.
///
/// Rules with no pending dependencies are released in declaration order, so
/// the result is deterministic.
fn topological_sort(rules: &[&Rule], rule_map: &HashMap<&str, &Rule>) -> Result<Vec<String>, CompileError> {
    // dependents[X] = rules that depend on X (X must be evaluated before them)
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = rules.iter().map(|r| (r.name.as_str(), 0)).collect();

    for rule in rules {
        for dep in rule.condition.rule_refs() {
            if rule_map.contains_key(dep) {
                dependents.entry(dep).or_default().push(rule.name.as_str());
                *in_degree.entry(rule.name.as_str()).or_insert(0) += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = rules
        .iter()
        .map(|r| r.name.as_str())
        .filter(|name| in_degree.get(name) == Some(&0))
        .collect();

    let mut sorted = Vec::with_capacity(rules.len());

    while let Some(name) = queue.pop_front() {
        if let Some(deps) = dependents.get(name) {
            for dependent in deps {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }
        sorted.push(name.to_owned());
    }

    if sorted.len() != rules.len() {
        return Err(CompileError::CyclicDependency {
            path: find_cycle(rules, rule_map),
        });
    }

    Ok(sorted)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DfsState {
    Unvisited,
    InStack,
    Done,
}

/// DFS-based cycle finder for error reporting.
fn find_cycle(rules: &[&Rule], rule_map: &HashMap<&str, &Rule>) -> Vec<String> {
    let adj: HashMap<&str, Vec<&str>> = rules
        .iter()
        .map(|rule| {
            let deps = rule
                .condition
                .rule_refs()
                .into_iter()
                .filter(|r| rule_map.contains_key(r))
                .collect();
            (rule.name.as_str(), deps)
        })
        .collect();

    let mut state: HashMap<&str, DfsState> = rules
        .iter()
        .map(|r| (r.name.as_str(), DfsState::Unvisited))
        .collect();
    let mut stack: Vec<&str> = Vec::new();

    for rule in rules {
        let name = rule.name.as_str();
        if state.get(name) == Some(&DfsState::Unvisited)
            && let Some(cycle) = dfs(name, &adj, &mut state, &mut stack)
        {
            return cycle;
        }
    }

    vec![]
}

fn dfs<'a>(
    node: &'a str,
    adj: &HashMap<&'a str, Vec<&'a str>>,
    state: &mut HashMap<&'a str, DfsState>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    state.insert(node, DfsState::InStack);
    stack.push(node);

    if let Some(neighbors) = adj.get(node) {
        for &neighbor in neighbors {
            match state.get(neighbor) {
                Some(DfsState::InStack) => {
                    let pos = stack.iter().position(|&n| n == neighbor)?;
                    let mut cycle: Vec<String> =
                        stack[pos..].iter().map(|&s| s.to_owned()).collect();
                    cycle.push(neighbor.to_owned());
                    return Some(cycle);
                }
                Some(DfsState::Unvisited) | None => {
                    if let Some(cycle) = dfs(neighbor, adj, state, stack) {
                        return Some(cycle);
                    }
                }
                Some(DfsState::Done) => {}
            }
        }
    }

    stack.pop();
    state.insert(node, DfsState::Done);
    None
}
