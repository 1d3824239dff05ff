/// Fuzzy membership conditions
mod common;

use anyhow::Result;
use common::{init_tracing, pattern};
use ripple_core::{FuzzySystem, FuzzyVariable, MinMax, Multiplicative, ReteEngine};
use std::sync::Arc;

fn sigmoid(a: f64, c: f64, x: f64) -> f64 {
    1.0 / (1.0 + (-a * (x - c)).exp())
}

#[derive(Debug)]
struct Quality(&'static str);

impl FuzzyVariable for Quality {
    fn name(&self) -> &str {
        self.0
    }

    fn has_value(&self, value: &str) -> bool {
        value == "excellent" || value == "poor"
    }

    fn membership(&self, value: &str, x: f64) -> f64 {
        if value == "excellent" { sigmoid(4.0, 0.7, x) } else { sigmoid(-4.0, 0.3, x) }
    }

    fn value_for_membership(&self, value: &str, degree: f64) -> Option<f64> {
        if degree <= 0.0 || degree >= 1.0 {
            return None;
        }
        let (a, c) = if value == "excellent" { (4.0, 0.7) } else { (-4.0, 0.3) };
        Some(c - (1.0 / degree - 1.0).ln() / a)
    }
}

fn certainty_of(engine: &ReteEngine, production: ripple_core::ProductionId, id: &str) -> Result<f64> {
    let matches = engine.matches(production)?;
    let fact = matches
        .iter()
        .filter_map(|m| m.fact(0))
        .find(|fact| fact.fields[0].to_string() == id)
        .ok_or_else(|| anyhow::anyhow!("no match for {id}"))?;
    Ok(fact.certainty)
}

#[test]
fn test_fuzzy_condition_sets_certainty() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    engine.register_fuzzy_variable(Arc::new(Quality("food")));
    let excellent = engine.add_production("fuzzy inference", vec![pattern("<x>", "food", "excellent")])?;
    let poor = engine.add_production("fuzzy inference 2", vec![pattern("<x>", "food", "poor")])?;

    engine.add("B1", "food", "0.3")?;
    engine.add("B2", "food", "0.9")?;
    assert_eq!(engine.matches(excellent)?.len(), 2);
    assert_eq!(engine.matches(poor)?.len(), 2);

    assert!((certainty_of(&engine, excellent, "B1")? - 0.17).abs() < 0.1);
    assert!((certainty_of(&engine, excellent, "B2")? - 0.69).abs() < 0.1);
    assert!((certainty_of(&engine, poor, "B1")? - 0.5).abs() < 0.1);
    assert!((certainty_of(&engine, poor, "B2")? - 0.08).abs() < 0.1);

    let stored = engine.find_fact("B1", "food", "0.3").map(|id| engine.fact(id));
    assert_eq!(stored.transpose()?.map(|f| f.certainty), Some(1.0), "working memory keeps the crisp fact");
    Ok(())
}

#[test]
fn test_conjunction_of_fuzzy_conditions() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    engine.register_fuzzy_variable(Arc::new(Quality("food")));
    engine.register_fuzzy_variable(Arc::new(Quality("service")));

    let large = engine.add_production(
        "large tip",
        vec![pattern("<x>", "food", "excellent"), pattern("<x>", "service", "excellent")],
    )?;
    let small =
        engine.add_production("small tip", vec![pattern("<x>", "food", "poor"), pattern("<x>", "service", "poor")])?;
    let medium = engine.add_production(
        "medium tip",
        vec![pattern("<x>", "food", "excellent"), pattern("<x>", "service", "poor")],
    )?;

    engine.add("B1", "food", "0.3")?;
    let service = engine.add("B1", "service", "0.9")?;
    for production in [large, small, medium] {
        assert_eq!(engine.matches(production)?.len(), 1);
    }

    let large_matches = engine.matches(large)?;
    let food_degree = sigmoid(4.0, 0.7, 0.3);
    let service_degree = sigmoid(4.0, 0.7, 0.9);
    assert!((MinMax.match_degree(&large_matches[0]) - food_degree.min(service_degree)).abs() < 1e-9);
    assert!((Multiplicative.match_degree(&large_matches[0]) - food_degree * service_degree).abs() < 1e-9);

    let tips: Vec<f64> = [large, small, medium]
        .iter()
        .map(|p| Ok(MinMax.match_degree(&engine.matches(*p)?[0])))
        .collect::<Result<_>>()?;
    let best = MinMax.disjunction(&tips);
    assert!(tips.iter().all(|degree| *degree <= best));

    let before = engine.stats().facts;
    engine.remove_fact(service)?;
    for production in [large, small, medium] {
        assert!(engine.matches(production)?.is_empty());
    }
    assert_eq!(before - engine.stats().facts, 3, "both membership copies go with their source");
    Ok(())
}

#[test]
fn test_unregistered_attribute_is_literal() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    let p = engine.add_production("literal", vec![pattern("<x>", "food", "excellent")])?;
    engine.add("B1", "food", "0.9")?;
    engine.add("B2", "food", "excellent")?;
    let matches = engine.matches(p)?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].to_string(), "(B2 food excellent)");
    Ok(())
}

#[test]
fn test_membership_can_be_inverted() -> Result<()> {
    init_tracing();
    let mut engine = ReteEngine::new();
    engine.register_fuzzy_variable(Arc::new(Quality("food")));
    let food = engine.fuzzy_variable("food").ok_or_else(|| anyhow::anyhow!("food is registered"))?;

    for x in [0.3, 0.5, 0.9] {
        let degree = food.membership("excellent", x);
        let back = food.value_for_membership("excellent", degree).unwrap_or(f64::NAN);
        assert!((back - x).abs() < 1e-9, "{x} came back as {back}");
    }
    assert_eq!(food.value_for_membership("poor", 1.0), None);
    assert!(engine.fuzzy_variable("service").is_none());
    Ok(())
}
