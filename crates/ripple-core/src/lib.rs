#![deny(warnings)]
#![allow(missing_docs)]
//! Incremental Rete matching for triple facts.
//!
//! A [`ReteEngine`] keeps a working memory of `(id attribute value)` facts
//! and a set of standing productions. Every insertion or retraction is
//! pushed through a shared network of alpha tests, joins, negations and
//! aggregates, so each production's match set is always current without
//! rescanning working memory.
//!
//! ```
//! use ripple_core::ReteEngine;
//! use ripple_types::{Condition, Field};
//!
//! let mut engine = ReteEngine::new();
//! let stacked = engine
//!     .add_production(
//!         "stacked",
//!         vec![Condition::new(Field::var("x"), Field::constant("on"), Field::var("y")).into()],
//!     )
//!     .unwrap();
//! engine.add("B1", "on", "B2").unwrap();
//! assert_eq!(engine.matches(stacked).unwrap().len(), 1);
//! ```

/// Aggregate and existence subnetworks
pub mod aggregate;
/// Single-fact test trie and alpha memories
pub mod alpha;
/// Join nodes and beta memories
pub mod beta;
/// Condition planning and network construction
pub mod compile;
/// Engine configuration
pub mod config;
/// Engine facade over working memory and the network
pub mod engine;
/// Error types
pub mod error;
/// Partial match reconstruction
pub mod explain;
/// Fuzzy membership tests
pub mod fuzzy;
/// Negated conjunctions
pub mod ncc;
/// Node storage, activation dispatch and teardown
pub mod network;
/// Production nodes and match deltas
pub mod production;
/// Token chains
pub mod token;

pub use config::{AlphaStrategy, EngineConfig};
pub use engine::{ProductionId, ReteEngine};
pub use error::{ErrorSeverity, ReteError, ReteResult};
pub use explain::IncompleteMatch;
pub use fuzzy::{FuzzyMembership, FuzzySystem, FuzzyVariable, MinMax, Multiplicative};
pub use network::{NetworkStats, NodeId, ProductionLayout};
pub use production::{Bindings, Match, MatchDelta};
