//! Fuzzy membership tests
//!
//! A condition such as `(<x> food excellent)` on a registered fuzzy
//! variable `food` does not compare the value field literally. It accepts
//! any numeric value and propagates a copy of the fact whose certainty is
//! the membership degree of that number in `excellent`.
//!
//! A [`FuzzySystem`] combines the degrees of a match's facts into the
//! degree of the whole match.

use crate::production::Match;
use ripple_types::{Fact, FactPredicate, FieldIndex};
use std::fmt;
use std::sync::Arc;

/// A linguistic variable with named fuzzy values
pub trait FuzzyVariable: fmt::Debug + Send + Sync {
    /// Attribute name the variable is matched on
    fn name(&self) -> &str;

    /// Whether `value` is one of this variable's fuzzy values
    fn has_value(&self, value: &str) -> bool;

    /// Degree in `[0, 1]` to which `x` belongs to `value`
    fn membership(&self, value: &str, x: f64) -> f64;

    /// Inverse of [`membership`](Self::membership): a crisp `x` whose degree
    /// in `value` is `degree`, or `None` where the function cannot be inverted
    fn value_for_membership(&self, value: &str, degree: f64) -> Option<f64>;
}

/// Fuzzy logic connectives
pub trait FuzzySystem: fmt::Debug + Send + Sync {
    /// Degree of `a and b and ...`; 1.0 for no operands
    fn conjunction(&self, degrees: &[f64]) -> f64;

    /// Degree of `a or b or ...`; 0.0 for no operands
    fn disjunction(&self, degrees: &[f64]) -> f64;

    /// Conjunction over the certainties of every fact in a match
    fn match_degree(&self, matched: &Match) -> f64 {
        let degrees: Vec<f64> = matched.facts().map(|fact| fact.certainty).collect();
        self.conjunction(&degrees)
    }
}

/// Zadeh connectives: minimum and maximum
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMax;

impl FuzzySystem for MinMax {
    fn conjunction(&self, degrees: &[f64]) -> f64 {
        degrees.iter().copied().fold(1.0, f64::min)
    }

    fn disjunction(&self, degrees: &[f64]) -> f64 {
        degrees.iter().copied().fold(0.0, f64::max)
    }
}

/// Product conjunction and probabilistic-sum disjunction
#[derive(Debug, Clone, Copy, Default)]
pub struct Multiplicative;

impl FuzzySystem for Multiplicative {
    fn conjunction(&self, degrees: &[f64]) -> f64 {
        degrees.iter().product()
    }

    fn disjunction(&self, degrees: &[f64]) -> f64 {
        1.0 - degrees.iter().map(|d| 1.0 - d).product::<f64>()
    }
}

/// Alpha test accepting numeric values and attaching their membership degree
#[derive(Debug, Clone)]
pub struct FuzzyMembership {
    variable: Arc<dyn FuzzyVariable>,
    value: String,
}

impl FuzzyMembership {
    pub fn new(variable: Arc<dyn FuzzyVariable>, value: impl Into<String>) -> Self {
        Self { variable, value: value.into() }
    }
}

impl FactPredicate for FuzzyMembership {
    fn key(&self) -> String {
        format!("fuzzy:{}={}", self.variable.name(), self.value)
    }

    fn accepts(&self, fact: &Fact) -> bool {
        fact.field(FieldIndex::Value).as_number().is_some()
    }

    fn transform(&self, fact: &Fact) -> Option<Fact> {
        let x = fact.field(FieldIndex::Value).as_number()?;
        let degree = self.variable.membership(&self.value, x).clamp(0.0, 1.0);
        Some(fact.clone().with_certainty(degree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Threshold;

    impl FuzzyVariable for Threshold {
        fn name(&self) -> &str {
            "level"
        }

        fn has_value(&self, value: &str) -> bool {
            value == "high"
        }

        fn membership(&self, _value: &str, x: f64) -> f64 {
            x * 2.0
        }

        fn value_for_membership(&self, _value: &str, degree: f64) -> Option<f64> {
            Some(degree / 2.0)
        }
    }

    #[test]
    fn test_membership_sets_certainty() {
        let test = FuzzyMembership::new(Arc::new(Threshold), "high");
        assert_eq!(test.key(), "fuzzy:level=high");

        let fact = Fact::new("B1", "level", "0.25");
        assert!(test.accepts(&fact));
        assert_eq!(test.transform(&fact).unwrap().certainty, 0.5);

        let clamped = test.transform(&Fact::new("B1", "level", "0.9")).unwrap();
        assert_eq!(clamped.certainty, 1.0);
    }

    #[test]
    fn test_connectives() {
        let degrees = [0.2, 0.5];
        assert_eq!(MinMax.conjunction(&degrees), 0.2);
        assert_eq!(MinMax.disjunction(&degrees), 0.5);
        assert!((Multiplicative.conjunction(&degrees) - 0.1).abs() < 1e-12);
        assert!((Multiplicative.disjunction(&degrees) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_connectives_on_no_operands() {
        assert_eq!(MinMax.conjunction(&[]), 1.0);
        assert_eq!(MinMax.disjunction(&[]), 0.0);
        assert_eq!(Multiplicative.conjunction(&[]), 1.0);
        assert_eq!(Multiplicative.disjunction(&[]), 0.0);
    }

    #[test]
    fn test_inverse_membership() {
        assert_eq!(Threshold.value_for_membership("high", 0.5), Some(0.25));
    }

    #[test]
    fn test_non_numeric_values_are_rejected() {
        let test = FuzzyMembership::new(Arc::new(Threshold), "high");
        assert!(!test.accepts(&Fact::new("B1", "level", "high")));
    }
}
