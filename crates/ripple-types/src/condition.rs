//! Conditions as produced by a query front-end.

use crate::aggregate::AggregateSpec;
use crate::arith::ArithTest;
use crate::predicate::FactPredicate;
use crate::value::FieldIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One position of a condition: a literal or a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Must equal this literal.
    Const(String),
    /// Binds, or must agree with, this variable.
    Var(String),
}

impl Field {
    /// Literal field.
    pub fn constant(text: impl Into<String>) -> Self {
        Field::Const(text.into())
    }

    /// Variable field.
    pub fn var(name: impl Into<String>) -> Self {
        Field::Var(name.into())
    }

    /// Variable name, if any.
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Field::Var(name) => Some(name),
            Field::Const(_) => None,
        }
    }

    /// Literal text, if any.
    pub fn as_const(&self) -> Option<&str> {
        match self {
            Field::Const(text) => Some(text),
            Field::Var(_) => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Const(text) => write!(f, "{text}"),
            Field::Var(name) => write!(f, "<{name}>"),
        }
    }
}

/// A single-fact pattern with optional arithmetic tests.
#[derive(Debug, Clone)]
pub struct Condition {
    /// Field specifiers in triple order.
    pub fields: [Field; 3],
    /// Tests over this condition's variables (and earlier bindings).
    pub intra_tests: Vec<ArithTest>,
    /// Tests relating this condition to earlier bindings.
    pub extra_tests: Vec<ArithTest>,
    /// Name bound to the whole matched fact.
    pub fact_var: Option<String>,
    /// Custom alpha tests applied after the field tests.
    pub predicates: Vec<Arc<dyn FactPredicate>>,
}

impl Condition {
    /// Pattern over three field specifiers.
    pub fn new(id: Field, attribute: Field, value: Field) -> Self {
        Self {
            fields: [id, attribute, value],
            intra_tests: Vec::new(),
            extra_tests: Vec::new(),
            fact_var: None,
            predicates: Vec::new(),
        }
    }

    /// Adds an intra test.
    pub fn with_intra_test(mut self, test: ArithTest) -> Self {
        self.intra_tests.push(test);
        self
    }

    /// Adds an extra test.
    pub fn with_extra_test(mut self, test: ArithTest) -> Self {
        self.extra_tests.push(test);
        self
    }

    /// Binds the whole matched fact to `name`.
    pub fn binding_fact(mut self, name: impl Into<String>) -> Self {
        self.fact_var = Some(name.into());
        self
    }

    /// Adds a custom alpha predicate.
    pub fn with_predicate(mut self, predicate: Arc<dyn FactPredicate>) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Field specifier at a position.
    pub fn field(&self, index: FieldIndex) -> &Field {
        &self.fields[index.position()]
    }

    /// Positions holding variable `name`.
    pub fn positions_of(&self, name: &str) -> Vec<FieldIndex> {
        FieldIndex::ALL
            .into_iter()
            .filter(|index| self.field(*index).as_var() == Some(name))
            .collect()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.fields[0], self.fields[1], self.fields[2])?;
        for test in self.intra_tests.iter().chain(&self.extra_tests) {
            write!(f, "[{test}]")?;
        }
        Ok(())
    }
}

/// Element of a production body.
#[derive(Debug, Clone)]
pub enum GenericCondition {
    /// Plain pattern.
    Pattern(Condition),
    /// Holds while the inner conditions have no match.
    Negation(Vec<GenericCondition>),
    /// Holds while the inner conditions have at least one match.
    Existence(Vec<GenericCondition>),
    /// Binds `result_var` to a reduction over the inner matches.
    Aggregate {
        /// Variable receiving the reduced value.
        result_var: String,
        /// The reduction.
        spec: AggregateSpec,
        /// Inner conditions.
        conditions: Vec<GenericCondition>,
    },
}

impl GenericCondition {
    /// Aggregate condition.
    pub fn aggregate(
        result_var: impl Into<String>,
        spec: AggregateSpec,
        conditions: Vec<GenericCondition>,
    ) -> Self {
        GenericCondition::Aggregate { result_var: result_var.into(), spec, conditions }
    }
}

impl From<Condition> for GenericCondition {
    fn from(condition: Condition) -> Self {
        GenericCondition::Pattern(condition)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, conditions: &[GenericCondition]) -> fmt::Result {
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{condition}")?;
    }
    Ok(())
}

impl fmt::Display for GenericCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenericCondition::Pattern(c) => write!(f, "{c}"),
            GenericCondition::Negation(inner) => {
                write!(f, "NOT[")?;
                write_list(f, inner)?;
                write!(f, "]")
            }
            GenericCondition::Existence(inner) => {
                write!(f, "EXISTS[")?;
                write_list(f, inner)?;
                write!(f, "]")
            }
            GenericCondition::Aggregate { result_var, spec, conditions } => {
                write!(f, "(<{result_var}> <- {spec} from {{")?;
                write_list(f, conditions)?;
                write!(f, "}})")
            }
        }
    }
}
