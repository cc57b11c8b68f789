use proptest::prelude::*;
use ruleflow::RuleProgram;

const FRAGMENTS: &[&str] = &[
    "rule ", "r1", "r2", ":", " ", "\n", "params.x", "Applicant.age", "==", ">=", "1", "2.5",
    "\"s\"", "true", "AND ", "OR ", "NOT ", "(", ")", "then ", "set k = ", "fail \"m\"",
    "log \"m\"", "declare Applicant\n", "age: int\n", "end\n", "package p\n", "(priority 3)", "#c\n",
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn arbitrary_text_never_panics(text in ".{0,200}") {
        let _ = RuleProgram::from_source(&text);
    }

    #[test]
    fn token_soup_never_panics(parts in prop::collection::vec(prop::sample::select(FRAGMENTS), 0..40)) {
        let source = parts.concat();
        if let Err(diagnostics) = RuleProgram::from_source(&source) {
            prop_assert!(!diagnostics.is_empty());
        }
    }

    #[test]
    fn compiled_programs_are_bound_to_their_text(n in 0_i64..1000) {
        let source = format!("rule r:\n  params.x == {n}\n  then set n = {n}");
        let program = RuleProgram::from_source(&source).unwrap();
        prop_assert!(program.compiled_from(&source));
        prop_assert_eq!(program.agenda_order(), vec!["r"]);
    }
}
