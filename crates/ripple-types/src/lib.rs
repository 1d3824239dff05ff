//! Ripple Types
//!
//! Pure data model shared by the Ripple matcher and its front-ends: facts,
//! conditions, arithmetic tests and the two extension points (aggregate
//! computations and custom alpha predicates). Nothing here touches a network.

#![warn(missing_docs)]

pub mod aggregate;
pub mod arith;
pub mod condition;
pub mod predicate;
pub mod value;

pub use aggregate::{AggregateComputation, AggregateSpec, BindingRow, Count, Exists, Sum};
pub use arith::{ArithError, ArithExpr, ArithOp, ArithTest, CompOp};
pub use condition::{Condition, Field, GenericCondition};
pub use predicate::FactPredicate;
pub use value::{Fact, FactId, FieldIndex, FieldValue, TokenId};
