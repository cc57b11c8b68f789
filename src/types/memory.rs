use std::collections::HashMap;

use serde_json::Value as JsonValue;

use super::Value;
use super::fact::{FactInstance, FieldValue};

/// Working memory of one session: dot-separated field paths mapped to [`Value`]s.
///
/// Every inserted fact is flattened into it under its root (`Applicant.age`,
/// `params.amount`, `context.region`), which is what rule conditions read.
#[derive(Debug, Clone, Default)]
pub struct WorkingMemory {
    data: HashMap<String, Slot>,
}

#[derive(Debug, Clone)]
enum Slot {
    Leaf(Value),
    Nested(HashMap<String, Slot>),
}

impl WorkingMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value at a dot-separated path, creating intermediate maps as needed.
    pub fn insert(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::insert_recursive(&mut self.data, &segments, value);
    }

    /// Flatten a fact instance under its shape name.
    pub fn insert_instance(&mut self, instance: &FactInstance) {
        self.insert_instance_at(instance.shape(), instance);
    }

    fn insert_instance_at(&mut self, prefix: &str, instance: &FactInstance) {
        for (field, value) in instance.fields() {
            let path = format!("{prefix}.{field}");
            match value {
                FieldValue::Scalar(v) => self.insert(&path, v.clone()),
                FieldValue::Record(nested) => self.insert_instance_at(&path, nested),
            }
        }
    }

    /// Flatten a JSON value under `prefix`. Arrays are addressed by index
    /// (`params.items.0`); `null` is skipped.
    pub fn insert_json(&mut self, prefix: &str, json: &JsonValue) {
        match json {
            JsonValue::Object(map) => {
                for (key, value) in map {
                    self.insert_json(&format!("{prefix}.{key}"), value);
                }
            }
            JsonValue::Array(items) => {
                for (i, value) in items.iter().enumerate() {
                    self.insert_json(&format!("{prefix}.{i}"), value);
                }
            }
            scalar => {
                if let Some(v) = Value::from_json(scalar) {
                    self.insert(prefix, v);
                }
            }
        }
    }

    /// Look up a value by dot-separated path.
    /// Returns `None` if the path does not exist or points to a nested map.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        Self::get_recursive(&self.data, &segments)
    }

    fn insert_recursive(map: &mut HashMap<String, Slot>, segments: &[&str], value: Value) {
        match segments {
            [] => {}
            [last] => {
                map.insert((*last).to_owned(), Slot::Leaf(value));
            }
            [first, rest @ ..] => {
                let entry = map
                    .entry((*first).to_owned())
                    .or_insert_with(|| Slot::Nested(HashMap::new()));
                if let Slot::Leaf(_) = entry {
                    *entry = Slot::Nested(HashMap::new());
                }
                if let Slot::Nested(nested) = entry {
                    Self::insert_recursive(nested, rest, value);
                }
            }
        }
    }

    fn get_recursive<'a>(map: &'a HashMap<String, Slot>, segments: &[&str]) -> Option<&'a Value> {
        match segments {
            [] => None,
            [last] => match map.get(*last)? {
                Slot::Leaf(v) => Some(v),
                Slot::Nested(_) => None,
            },
            [first, rest @ ..] => match map.get(*first)? {
                Slot::Nested(nested) => Self::get_recursive(nested, rest),
                Slot::Leaf(_) => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn insert_and_get_nested() {
        let mut mem = WorkingMemory::new();
        mem.insert("Applicant.age", Value::Int(25));
        assert_eq!(mem.get("Applicant.age"), Some(&Value::Int(25)));
        assert_eq!(mem.get("Applicant"), None);
        assert_eq!(mem.get("Applicant.name"), None);
    }

    #[test]
    fn leaf_overwritten_by_nested() {
        let mut mem = WorkingMemory::new();
        mem.insert("user", Value::from("old"));
        mem.insert("user.age", Value::Int(30));
        assert_eq!(mem.get("user.age"), Some(&Value::Int(30)));
        assert_eq!(mem.get("user"), None);
    }

    #[test]
    fn instance_flattened_under_shape_name() {
        let mut address = FactInstance::new("Address");
        address.set("city", FieldValue::Scalar(Value::from("Lima")));
        let mut applicant = FactInstance::new("Applicant");
        applicant.set("age", FieldValue::Scalar(Value::Int(41)));
        applicant.set("home", FieldValue::Record(address));

        let mut mem = WorkingMemory::new();
        mem.insert_instance(&applicant);
        assert_eq!(mem.get("Applicant.age"), Some(&Value::Int(41)));
        assert_eq!(mem.get("Applicant.home.city"), Some(&Value::from("Lima")));
    }

    #[test]
    fn json_flattened_with_array_indices() {
        let mut mem = WorkingMemory::new();
        mem.insert_json(
            "params",
            &json!({"amount": 1200, "tags": ["a", "b"], "owner": {"vip": true}, "gone": null}),
        );
        assert_eq!(mem.get("params.amount"), Some(&Value::Int(1200)));
        assert_eq!(mem.get("params.tags.1"), Some(&Value::from("b")));
        assert_eq!(mem.get("params.owner.vip"), Some(&Value::Bool(true)));
        assert_eq!(mem.get("params.gone"), None);
    }

    #[test]
    fn empty_memory_returns_none() {
        assert_eq!(WorkingMemory::new().get("anything"), None);
    }
}
