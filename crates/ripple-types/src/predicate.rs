//! Custom single-fact tests for the alpha network.

use crate::value::Fact;
use std::fmt;

/// A pluggable alpha-network test.
///
/// Predicates with equal [`key`](FactPredicate::key)s are treated as the
/// same test node and shared between conditions, so the key must capture
/// every parameter that influences `accepts` and `transform`.
pub trait FactPredicate: fmt::Debug + Send + Sync {
    /// Identity used for node sharing.
    fn key(&self) -> String;

    /// Whether the fact passes this test.
    fn accepts(&self, fact: &Fact) -> bool;

    /// Replacement for the fact propagated below this test, if any.
    ///
    /// Used by fuzzy tests to attach a derived certainty.
    fn transform(&self, _fact: &Fact) -> Option<Fact> {
        None
    }
}
