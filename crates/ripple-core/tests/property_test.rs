/// Property tests: match sets depend only on working memory contents
mod common;

use common::{cond, pattern};
use proptest::prelude::*;
use ripple_core::{ProductionId, ReteEngine};
use ripple_types::{AggregateSpec, ArithExpr, ArithTest, CompOp, GenericCondition};

fn triple() -> impl Strategy<Value = (String, String, String)> {
    (
        prop::sample::select(vec!["B1", "B2", "B3"]),
        prop::sample::select(vec!["on", "color"]),
        prop::sample::select(vec!["B1", "B2", "B3", "table"]),
    )
        .prop_map(|(id, attribute, value)| (id.to_string(), attribute.to_string(), value.to_string()))
}

fn productions(engine: &mut ReteEngine) -> Vec<ProductionId> {
    let bodies: Vec<Vec<GenericCondition>> = vec![
        vec![pattern("<x>", "on", "<y>"), pattern("<y>", "on", "<z>")],
        vec![
            pattern("<x>", "on", "<y>"),
            GenericCondition::Negation(vec![pattern("<z>", "on", "<x>")]),
        ],
        vec![
            pattern("<x>", "on", "<y>"),
            GenericCondition::Existence(vec![pattern("<y>", "color", "<c>")]),
        ],
        vec![pattern("<x>", "on", "<y>"), count("cn", vec![pattern("<y>", "color", "<c>")])],
        vec![
            pattern("<x>", "on", "<y>"),
            count("cn", vec![pattern("<y>", "color", "<c>")]),
            cond("<x>", "color", "<d>").with_extra_test(more_than_one("cn")).into(),
        ],
        vec![
            pattern("<x>", "on", "<y>"),
            GenericCondition::Negation(vec![
                pattern("<z>", "on", "<x>"),
                GenericCondition::Negation(vec![pattern("<y>", "on", "table")]),
            ]),
        ],
        vec![
            pattern("<x>", "on", "<y>"),
            GenericCondition::Negation(vec![
                count("cn", vec![pattern("<y>", "on", "<z>")]),
                cond("<y>", "color", "<c>").with_extra_test(more_than_one("cn")).into(),
            ]),
        ],
        vec![
            pattern("<x>", "on", "<y>"),
            count(
                "cn",
                vec![
                    pattern("<y>", "color", "<c>"),
                    GenericCondition::Negation(vec![pattern("<c>", "on", "table")]),
                ],
            ),
        ],
        vec![
            pattern("<x>", "on", "<y>"),
            GenericCondition::Existence(vec![
                pattern("<y>", "color", "<c>"),
                GenericCondition::Negation(vec![pattern("<c>", "on", "table")]),
            ]),
        ],
    ];
    bodies
        .into_iter()
        .enumerate()
        .map(|(i, body)| engine.add_production(&format!("p{i}"), body).expect("valid production"))
        .collect()
}

fn count(result_var: &str, conditions: Vec<GenericCondition>) -> GenericCondition {
    GenericCondition::aggregate(result_var, AggregateSpec::named("#COUNT"), conditions)
}

fn more_than_one(var: &str) -> ArithTest {
    ArithTest::new(ArithExpr::var(var), CompOp::Gt, ArithExpr::Number(1.0))
}

/// Structural keys of every production's matches, sorted
fn snapshot(engine: &ReteEngine, productions: &[ProductionId]) -> Vec<Vec<String>> {
    productions
        .iter()
        .map(|p| {
            let mut rows: Vec<String> = engine
                .matches(*p)
                .expect("live production")
                .iter()
                .map(|m| {
                    m.key()
                        .iter()
                        .map(|[id, attribute, value]| format!("({id} {attribute} {value})"))
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .collect();
            rows.sort();
            rows
        })
        .collect()
}

fn load(engine: &mut ReteEngine, facts: &[(String, String, String)]) {
    for (id, attribute, value) in facts {
        engine.add(id.as_str(), attribute.as_str(), value.as_str()).expect("insert");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_insertion_order_does_not_matter(
        facts in prop::collection::vec(triple(), 0..12).prop_shuffle(),
        seed in any::<u64>(),
    ) {
        let mut forward = ReteEngine::new();
        let forward_ids = productions(&mut forward);
        load(&mut forward, &facts);

        let mut shuffled = facts.clone();
        let len = shuffled.len().max(1);
        shuffled.rotate_left((seed as usize) % len);
        shuffled.reverse();
        let mut backward = ReteEngine::new();
        load(&mut backward, &shuffled);
        let backward_ids = productions(&mut backward);

        prop_assert_eq!(snapshot(&forward, &forward_ids), snapshot(&backward, &backward_ids));
    }

    #[test]
    fn test_retraction_undoes_insertion(
        base in prop::collection::vec(triple(), 0..8),
        extra in prop::collection::vec(triple(), 0..8),
    ) {
        let mut engine = ReteEngine::new();
        let ids = productions(&mut engine);
        load(&mut engine, &base);
        let expected = snapshot(&engine, &ids);
        let baseline = engine.stats();

        let mut added = Vec::new();
        for (id, attribute, value) in &extra {
            if engine.find_fact(id.as_str(), attribute.as_str(), value.as_str()).is_none() {
                added.push(engine.add(id.as_str(), attribute.as_str(), value.as_str()).expect("insert"));
            }
        }
        for fact in added.into_iter().rev() {
            engine.remove_fact(fact).expect("retract");
        }

        prop_assert_eq!(snapshot(&engine, &ids), expected);
        prop_assert_eq!(engine.stats(), baseline);
    }

    #[test]
    fn test_duplicate_inserts_are_idempotent(facts in prop::collection::vec(triple(), 0..10)) {
        let mut once = ReteEngine::new();
        let once_ids = productions(&mut once);
        load(&mut once, &facts);

        let mut twice = ReteEngine::new();
        let twice_ids = productions(&mut twice);
        load(&mut twice, &facts);
        load(&mut twice, &facts);

        prop_assert_eq!(snapshot(&once, &once_ids), snapshot(&twice, &twice_ids));
        prop_assert_eq!(once.stats().working_memory, twice.stats().working_memory);
    }
}
