//! Aggregation extension point.
//!
//! A computation folds the binding rows of every inner match of an
//! aggregate condition into one number. The engine decides when to call it
//! and always recomputes a group from scratch, so implementations only need
//! `reduce` to be associative and commutative with `identity` as its unit.

use crate::value::FieldValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Variable name to field value, restricted to a computation's variables.
pub type BindingRow = HashMap<String, FieldValue>;

/// A commutative, associative reduction over binding rows.
pub trait AggregateComputation: fmt::Debug + Send + Sync {
    /// Name used in logs and for registry lookups.
    fn name(&self) -> String;

    /// Unit of `reduce`.
    fn identity(&self) -> f64;

    /// Projects one inner match.
    fn map(&self, row: &BindingRow) -> f64;

    /// Combines two partial results.
    fn reduce(&self, acc: f64, value: f64) -> f64;

    /// Variables `map` reads from its row.
    fn variables(&self) -> Vec<String>;
}

/// Folds `rows` with `computation`.
pub fn fold_rows(computation: &dyn AggregateComputation, rows: &[BindingRow]) -> f64 {
    rows.iter()
        .fold(computation.identity(), |acc, row| computation.reduce(acc, computation.map(row)))
}

/// Number of inner matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

impl AggregateComputation for Count {
    fn name(&self) -> String {
        "#COUNT".to_string()
    }

    fn identity(&self) -> f64 {
        0.0
    }

    fn map(&self, _row: &BindingRow) -> f64 {
        1.0
    }

    fn reduce(&self, acc: f64, value: f64) -> f64 {
        acc + value
    }

    fn variables(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Sum of a numeric variable. Non-numeric values count as zero.
#[derive(Debug, Clone)]
pub struct Sum {
    variable: String,
}

impl Sum {
    /// Sums the values bound to `variable`.
    pub fn new(variable: impl Into<String>) -> Self {
        Self { variable: variable.into() }
    }
}

impl AggregateComputation for Sum {
    fn name(&self) -> String {
        format!("#SUM({})", self.variable)
    }

    fn identity(&self) -> f64 {
        0.0
    }

    fn map(&self, row: &BindingRow) -> f64 {
        row.get(&self.variable).and_then(FieldValue::as_number).unwrap_or(0.0)
    }

    fn reduce(&self, acc: f64, value: f64) -> f64 {
        acc + value
    }

    fn variables(&self) -> Vec<String> {
        vec![self.variable.clone()]
    }
}

/// 1 when at least one inner match exists, 0 otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exists;

impl AggregateComputation for Exists {
    fn name(&self) -> String {
        "#EXISTS".to_string()
    }

    fn identity(&self) -> f64 {
        0.0
    }

    fn map(&self, _row: &BindingRow) -> f64 {
        1.0
    }

    fn reduce(&self, acc: f64, value: f64) -> f64 {
        acc.max(value)
    }

    fn variables(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Built-in computation for a front-end name such as `#COUNT` or `#SUM`.
pub fn builtin(name: &str, argument: Option<&str>) -> Option<Arc<dyn AggregateComputation>> {
    let normalized = name.trim_start_matches('#').to_ascii_uppercase();
    match (normalized.as_str(), argument) {
        ("COUNT", _) => Some(Arc::new(Count)),
        ("SUM", Some(variable)) => Some(Arc::new(Sum::new(variable))),
        _ => None,
    }
}

/// How an aggregate condition names its computation.
#[derive(Debug, Clone)]
pub enum AggregateSpec {
    /// Resolved by name when the production is compiled.
    Named {
        /// Computation name, e.g. `#SUM`.
        name: String,
        /// Variable argument, if the computation takes one.
        argument: Option<String>,
    },
    /// A caller-supplied computation.
    Computation(Arc<dyn AggregateComputation>),
}

impl AggregateSpec {
    /// Named computation without an argument.
    pub fn named(name: impl Into<String>) -> Self {
        AggregateSpec::Named { name: name.into(), argument: None }
    }

    /// Named computation over one variable.
    pub fn named_with(name: impl Into<String>, argument: impl Into<String>) -> Self {
        AggregateSpec::Named { name: name.into(), argument: Some(argument.into()) }
    }
}

impl fmt::Display for AggregateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateSpec::Named { name, argument: Some(arg) } => write!(f, "{name}({arg})"),
            AggregateSpec::Named { name, argument: None } => write!(f, "{name}()"),
            AggregateSpec::Computation(c) => write!(f, "{}", c.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: &str) -> BindingRow {
        let mut row = BindingRow::new();
        row.insert("s".to_string(), FieldValue::from(value));
        row
    }

    #[test]
    fn test_count_and_sum() {
        let rows = vec![row("500"), row("700"), row("oops")];
        assert_eq!(fold_rows(&Count, &rows), 3.0);
        assert_eq!(fold_rows(&Sum::new("s"), &rows), 1200.0);
        assert_eq!(fold_rows(&Exists, &rows), 1.0);
        assert_eq!(fold_rows(&Exists, &[]), 0.0);
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(builtin("#COUNT", None).is_some());
        assert!(builtin("sum", Some("s")).is_some());
        assert!(builtin("#SUM", None).is_none(), "sum needs a variable");
        assert!(builtin("#MEDIAN", None).is_none());
    }
}
