/// Explaining productions that do not fire
mod common;

use anyhow::Result;
use common::{init_tracing, pattern};
use ripple_core::ReteEngine;
use ripple_types::{AggregateSpec, GenericCondition};

fn hunting() -> Vec<GenericCondition> {
    vec![
        pattern("<x>", "hunts", "<y>"),
        pattern("<y>", "eats", "<z>"),
        pattern("<z>", "help", "eyesight"),
    ]
}

#[test]
fn test_incomplete_match_walks_back_to_deepest_tokens() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    let p = engine.add_production("hunting", hunting())?;

    engine.add("Elmer", "hunts", "Bugs")?;
    let partial = engine.incomplete_matches(p)?;
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].to_string(), "(Elmer hunts Bugs),(Bugs eats <_0>)");

    engine.add("Bugs", "eats", "carrots")?;
    let partial = engine.incomplete_matches(p)?;
    assert_eq!(partial.len(), 1);
    assert_eq!(
        partial[0].to_string(),
        "(Elmer hunts Bugs),(Bugs eats carrots),(carrots help eyesight)"
    );

    engine.add("carrots", "help", "eyesight")?;
    assert_eq!(engine.matches(p)?.len(), 1);
    assert!(engine.incomplete_matches(p)?.is_empty());
    Ok(())
}

#[test]
fn test_incomplete_match_without_any_facts() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    let p = engine.add_production("hunting", hunting())?;
    let partial = engine.incomplete_matches(p)?;
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].conditions.len(), 1, "only the first condition is described");
    Ok(())
}

#[test]
fn test_one_incomplete_match_per_partial_token() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    let p = engine.add_production("hunting", hunting())?;
    engine.add("Elmer", "hunts", "Bugs")?;
    engine.add("Elmer", "hunts", "Daffy")?;

    let mut rendered: Vec<String> = engine.incomplete_matches(p)?.iter().map(ToString::to_string).collect();
    rendered.sort();
    assert_eq!(
        rendered,
        vec!["(Elmer hunts Bugs),(Bugs eats <_0>)", "(Elmer hunts Daffy),(Daffy eats <_0>)"]
    );
    Ok(())
}

#[test]
fn test_aggregate_results_stay_out_of_explanations() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    let p = engine.add_production(
        "within limit",
        vec![
            pattern("<x>", "on", "<y>"),
            GenericCondition::aggregate(
                "cn",
                AggregateSpec::named("#COUNT"),
                vec![pattern("<y>", "color", "<c>")],
            ),
            pattern("<y>", "allows", "<cn>"),
        ],
    )?;
    engine.add("B1", "on", "B2")?;
    engine.add("B2", "color", "red")?;

    let partial = engine.incomplete_matches(p)?;
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].to_string(), "(B1 on B2),(B2 allows 1)");
    assert!(!partial[0].to_string().contains("#token"));
    Ok(())
}
