use std::sync::Arc;
use std::thread;

use ruleflow::{DslEngine, DynamicRules, MemoryRuleStore, RuleDefinition, RuntimeConfig};
use serde_json::json;

fn limit_rule(limit: i64) -> String {
    format!("rule over:\n  params.amount > {limit}\n  then fail \"over the limit of {limit}\"")
}

fn main() {
    let rules = Arc::new(DynamicRules::new(
        DslEngine::new(),
        Arc::new(MemoryRuleStore::new()),
        RuntimeConfig::default(),
    ));
    let id = rules
        .rules()
        .save(RuleDefinition::new("limit", limit_rule(100)))
        .expect("failed to save rule");

    let workers: Vec<_> = (0..4_i64)
        .map(|worker| {
            let rules = Arc::clone(&rules);
            thread::spawn(move || {
                let params = json!({"amount": 150 + worker * 100})
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                let result = rules.runtime().execute_by_id(id, &params);
                println!("worker {worker}: amount {} -> {result}", params["amount"]);
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    rules
        .rules()
        .save(RuleDefinition::new("limit", limit_rule(1000)).with_id(id))
        .expect("failed to update rule");

    let params = json!({"amount": 450}).as_object().cloned().unwrap_or_default();
    let result = rules.runtime().execute_by_id(id, &params);
    println!("after raising the limit: amount 450 -> {result}");
}
