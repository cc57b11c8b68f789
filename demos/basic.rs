use std::sync::Arc;

use ruleflow::{DslEngine, DynamicRules, MemoryRuleStore, RuleDefinition, RuntimeConfig};
use serde_json::json;

const ACCESS: &str = r#"
declare User
    age: int
    status: enum(active, inactive)
end

rule eligible_age:
    User.age >= 18

rule active_account:
    User.status == "active"

rule can_proceed:
    eligible_age AND active_account
    then
        set verdict = "proceed"
        log "access granted"

rule too_young (priority 0):
    NOT eligible_age
    then
        fail "user must be an adult"
"#;

fn main() {
    let rules = DynamicRules::new(
        DslEngine::new(),
        Arc::new(MemoryRuleStore::new()),
        RuntimeConfig::default(),
    );

    let id = rules
        .rules()
        .save(RuleDefinition::new("access", ACCESS).with_description("basic access check"))
        .expect("failed to save rule");

    let program = rules.cache().get_by_id(id).expect("failed to compile rule");
    println!("{program}");

    for params in [
        json!({"age": 25, "status": "active"}),
        json!({"age": "16", "status": "active"}),
        json!({"age": 40, "status": "retired"}),
    ] {
        let params = params.as_object().cloned().unwrap_or_default();
        let result = rules.runtime().execute_by_name("access", &params);
        println!(
            "{} -> {}",
            serde_json::Value::Object(params),
            serde_json::to_string(&result).expect("result serializes")
        );
    }
}
