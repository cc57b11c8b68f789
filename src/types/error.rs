use thiserror::Error;

/// One semantic problem found while compiling rule text.
///
/// The compiler keeps going after the first problem, so a single compile can
/// report several of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("undefined rule reference '{reference}' in rule '{rule}'")]
    UndefinedRuleRef { rule: String, reference: String },

    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error("duplicate rule name '{name}'")]
    DuplicateRule { name: String },

    #[error("duplicate fact type '{name}'")]
    DuplicateShape { name: String },

    #[error("fact type name '{name}' is reserved")]
    ReservedShapeName { name: String },

    #[error("duplicate field '{field}' in fact type '{shape}'")]
    DuplicateField { shape: String, field: String },

    #[error("unknown type '{ty}' for field '{field}' in fact type '{shape}'")]
    UnknownType {
        shape: String,
        field: String,
        ty: String,
    },

    #[error("undefined field '{field}' in rule '{rule}'")]
    UndefinedField { rule: String, field: String },

    #[error("type mismatch in rule '{rule}': '{field}' is {expected}, compared with {found}")]
    TypeMismatch {
        rule: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("unknown variant {variant:?} for '{field}' in rule '{rule}'")]
    UnknownVariant {
        rule: String,
        field: String,
        variant: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_rule_ref_message() {
        let err = CompileError::UndefinedRuleRef {
            rule: "can_proceed".into(),
            reference: "nonexistent".into(),
        };
        assert_eq!(
            err.to_string(),
            "undefined rule reference 'nonexistent' in rule 'can_proceed'"
        );
    }

    #[test]
    fn cyclic_dependency_message() {
        let err = CompileError::CyclicDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency detected: a -> b -> a");
    }

    #[test]
    fn duplicate_rule_message() {
        let err = CompileError::DuplicateRule {
            name: "my_rule".into(),
        };
        assert_eq!(err.to_string(), "duplicate rule name 'my_rule'");
    }

    #[test]
    fn reserved_shape_name_message() {
        let err = CompileError::ReservedShapeName {
            name: "params".into(),
        };
        assert_eq!(err.to_string(), "fact type name 'params' is reserved");
    }

    #[test]
    fn unknown_type_message() {
        let err = CompileError::UnknownType {
            shape: "Applicant".into(),
            field: "home".into(),
            ty: "Adress".into(),
        };
        assert_eq!(
            err.to_string(),
            "unknown type 'Adress' for field 'home' in fact type 'Applicant'"
        );
    }

    #[test]
    fn type_mismatch_message() {
        let err = CompileError::TypeMismatch {
            rule: "adult".into(),
            field: "Applicant.age".into(),
            expected: "int".into(),
            found: "string".into(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch in rule 'adult': 'Applicant.age' is int, compared with string"
        );
    }

    #[test]
    fn unknown_variant_message() {
        let err = CompileError::UnknownVariant {
            rule: "gold".into(),
            field: "Applicant.tier".into(),
            variant: "PLATINUM".into(),
        };
        assert_eq!(
            err.to_string(),
            "unknown variant \"PLATINUM\" for 'Applicant.tier' in rule 'gold'"
        );
    }
}
