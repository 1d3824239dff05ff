/// Negated conjunction tests
mod common;

use anyhow::Result;
use common::{init_tracing, pattern};
use ripple_core::{Match, ReteEngine};
use ripple_types::GenericCondition;

fn not_under(x: &str) -> Vec<GenericCondition> {
    vec![
        pattern("<x>", "on", "<y>"),
        GenericCondition::Negation(vec![pattern("<z>", "on", &format!("<{x}>"))]),
    ]
}

/// The anchor fact of each match; the second entry is the placeholder
fn anchors(matches: &[Match]) -> Vec<String> {
    let mut out: Vec<String> =
        matches.iter().filter_map(|m| m.fact(0)).map(ToString::to_string).collect();
    out.sort();
    out
}

#[test]
fn test_negation_with_facts_first() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    engine.add("B1", "on", "B2")?;
    let b3 = engine.add("B3", "on", "B1")?;
    let p = engine.add_production("prod1", not_under("x"))?;

    let matches = engine.matches(p)?;
    assert_eq!(anchors(&matches), vec!["(B3 on B1)"]);
    assert_eq!(matches[0].len(), 2);
    assert_eq!(matches[0].last().map(ToString::to_string).as_deref(), Some("(#dummy #dummy #dummy)"));

    engine.remove_fact(b3)?;
    assert_eq!(anchors(&engine.matches(p)?), vec!["(B1 on B2)"]);
    Ok(())
}

#[test]
fn test_negation_with_production_first() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    let p = engine.add_production("prod1", not_under("x"))?;

    engine.add("B1", "on", "B2")?;
    assert_eq!(anchors(&engine.matches(p)?), vec!["(B1 on B2)"]);

    let b3 = engine.add("B3", "on", "B1")?;
    assert_eq!(anchors(&engine.matches(p)?), vec!["(B3 on B1)"], "B1 is now covered");

    engine.remove_fact(b3)?;
    assert_eq!(anchors(&engine.matches(p)?), vec!["(B1 on B2)"]);
    Ok(())
}

#[test]
fn test_nested_negation() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    let p = engine.add_production(
        "prod1",
        vec![
            pattern("<x>", "on", "<y>"),
            GenericCondition::Negation(vec![
                pattern("<z>", "on", "<x>"),
                GenericCondition::Negation(vec![pattern("<y>", "on", "table")]),
            ]),
        ],
    )?;

    engine.add("B1", "on", "B2")?;
    assert_eq!(anchors(&engine.matches(p)?), vec!["(B1 on B2)"]);

    engine.add("B3", "on", "B1")?;
    assert_eq!(anchors(&engine.matches(p)?), vec!["(B3 on B1)"]);

    let table = engine.add("B2", "on", "table")?;
    assert_eq!(
        anchors(&engine.matches(p)?),
        vec!["(B1 on B2)", "(B3 on B1)"],
        "B2 on table lifts the block on B1 and B1 on B2 covers B2"
    );

    engine.remove_fact(table)?;
    assert_eq!(anchors(&engine.matches(p)?), vec!["(B3 on B1)"]);
    Ok(())
}

#[test]
fn test_negation_as_first_condition() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    let p = engine.add_production(
        "empty table",
        vec![
            GenericCondition::Negation(vec![pattern("<b>", "on", "table")]),
            pattern("<t>", "is", "table"),
        ],
    )?;
    engine.add("T", "is", "table")?;
    assert_eq!(engine.matches(p)?.len(), 1);

    let b1 = engine.add("B1", "on", "table")?;
    assert!(engine.matches(p)?.is_empty());

    engine.remove_fact(b1)?;
    assert_eq!(engine.matches(p)?.len(), 1);
    Ok(())
}

#[test]
fn test_negation_inside_existence() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    let p = engine.add_production(
        "has a fresh color",
        vec![
            pattern("<x>", "on", "<y>"),
            GenericCondition::Existence(vec![
                pattern("<y>", "color", "<c>"),
                GenericCondition::Negation(vec![pattern("<c>", "faded", "yes")]),
            ]),
        ],
    )?;

    engine.add("B1", "on", "B2")?;
    engine.add("B2", "color", "red")?;
    assert_eq!(anchors(&engine.matches(p)?), vec!["(B1 on B2)"]);

    let faded = engine.add("red", "faded", "yes")?;
    assert!(engine.matches(p)?.is_empty());

    let blue = engine.add("B2", "color", "blue")?;
    assert_eq!(engine.matches(p)?.len(), 1);

    engine.remove_fact(blue)?;
    assert!(engine.matches(p)?.is_empty());
    engine.remove_fact(faded)?;
    assert_eq!(engine.matches(p)?.len(), 1);
    Ok(())
}

#[test]
fn test_negation_teardown() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    let baseline = engine.stats();
    engine.add("B1", "on", "B2")?;
    engine.add("B3", "on", "B1")?;

    let p = engine.add_production("prod1", not_under("x"))?;
    let stats = engine.stats();
    assert_eq!(stats.ncc_nodes, 1);
    assert_eq!(stats.ncc_partners, 1);

    engine.remove_production(p)?;
    let stats = engine.stats();
    assert_eq!(stats.ncc_nodes, 0);
    assert_eq!(stats.ncc_partners, 0);
    assert_eq!(stats.join_nodes, 0);
    assert_eq!(stats.beta_memories, 0);
    assert_eq!(stats.tokens, 0);
    assert_eq!(stats.test_nodes, baseline.test_nodes);
    Ok(())
}
