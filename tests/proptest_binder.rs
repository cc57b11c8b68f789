
use proptest::prelude::*;
use ruleflow::{FactInstance, FieldType, FieldValue, Value, instantiate};
use strategies::{TIERS, arb_params, schema};

fn check_instance(instance: &FactInstance, groups: &[ruleflow::FactGroup]) -> Result<(), TestCaseError> {
    let shape = ruleflow::find_shape(groups, instance.shape()).unwrap();
    for (name, value) in instance.fields() {
        let decl = shape.field(name);
        prop_assert!(decl.is_some(), "unknown field {} bound", name);
        let ty = &decl.unwrap().ty;
        match (ty, value) {
            (FieldType::Int, FieldValue::Scalar(Value::Int(_)))
            | (FieldType::Float, FieldValue::Scalar(Value::Float(_)))
            | (FieldType::Bool, FieldValue::Scalar(Value::Bool(_)))
            | (FieldType::String, FieldValue::Scalar(Value::String(_))) => {}
            (FieldType::Enum(_), FieldValue::Scalar(Value::String(s))) => {
                prop_assert!(TIERS.contains(&s.as_str()), "bad variant {}", s);
            }
            (FieldType::Shape(_), FieldValue::Record(nested)) => check_instance(nested, groups)?,
            (ty, value) => prop_assert!(false, "{:?} bound to {} field", value, ty),
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn bound_fields_always_match_declared_types(params in arb_params()) {
        let groups = schema();
        let mut diagnostics = Vec::new();
        let instance = instantiate(&groups[0].shapes[0], &groups, &params, &mut diagnostics);
        check_instance(&instance, &groups)?;
    }

    #[test]
    fn scalar_fields_are_always_present(params in arb_params()) {
        let groups = schema();
        let mut diagnostics = Vec::new();
        let instance = instantiate(&groups[0].shapes[0], &groups, &params, &mut diagnostics);
        for field in ["age", "income", "vip", "name"] {
            prop_assert!(instance.get(field).is_some(), "{} missing", field);
        }
    }

    #[test]
    fn diagnostics_only_name_declared_keys(params in arb_params()) {
        let groups = schema();
        let mut diagnostics = Vec::new();
        instantiate(&groups[0].shapes[0], &groups, &params, &mut diagnostics);
        for diagnostic in &diagnostics {
            let top = diagnostic.field.split('.').nth(1).unwrap();
            prop_assert!(params.contains_key(top), "{} reported but not supplied", diagnostic.field);
            prop_assert!(top != "extra");
        }
    }

    #[test]
    fn integer_inputs_bind_exactly(age in any::<i64>()) {
        let groups = schema();
        let mut params = ruleflow::Params::new();
        params.insert("age".into(), age.into());
        let mut diagnostics = Vec::new();
        let instance = instantiate(&groups[0].shapes[0], &groups, &params, &mut diagnostics);
        prop_assert_eq!(instance.get("age"), Some(&Value::Int(age)));
        prop_assert!(diagnostics.is_empty());
    }
}
