//! Facts and the values their fields hold.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Handle of a fact owned by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactId(pub u64);

/// Handle of a token (partial match) owned by an engine's beta network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub u64);

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#fact{}", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#token{}", self.0)
    }
}

/// Position of a field inside a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldIndex {
    /// The subject of the triple.
    Id,
    /// The predicate of the triple.
    Attribute,
    /// The object of the triple.
    Value,
}

impl FieldIndex {
    /// All positions in triple order.
    pub const ALL: [FieldIndex; 3] = [FieldIndex::Id, FieldIndex::Attribute, FieldIndex::Value];

    /// Zero-based position of this field.
    pub fn position(self) -> usize {
        match self {
            FieldIndex::Id => 0,
            FieldIndex::Attribute => 1,
            FieldIndex::Value => 2,
        }
    }
}

impl fmt::Display for FieldIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldIndex::Id => write!(f, "id"),
            FieldIndex::Attribute => write!(f, "attr"),
            FieldIndex::Value => write!(f, "val"),
        }
    }
}

/// Content of one fact field.
///
/// Besides plain symbols a field may point at another fact (relation
/// reification) or at a token (the owner of an aggregate result fact).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    /// A string scalar.
    Symbol(String),
    /// Reference to a fact by identity.
    Fact(FactId),
    /// Reference to a token by identity.
    Token(TokenId),
}

impl FieldValue {
    /// Returns the scalar text, if this field is a symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            FieldValue::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Parses the scalar text as a number.
    pub fn as_number(&self) -> Option<f64> {
        self.as_symbol().and_then(|s| s.trim().parse::<f64>().ok())
    }

    /// True when this field holds the given literal.
    pub fn is_symbol(&self, literal: &str) -> bool {
        self.as_symbol() == Some(literal)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Symbol(s) => write!(f, "{s}"),
            FieldValue::Fact(id) => write!(f, "{id}"),
            FieldValue::Token(id) => write!(f, "{id}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Symbol(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Symbol(value)
    }
}

impl From<FactId> for FieldValue {
    fn from(value: FactId) -> Self {
        FieldValue::Fact(value)
    }
}

impl From<TokenId> for FieldValue {
    fn from(value: TokenId) -> Self {
        FieldValue::Token(value)
    }
}

/// An `(id, attribute, value)` triple with a fuzzy certainty.
///
/// Facts are immutable once handed to an engine; the engine tracks them by
/// [`FactId`], never by structural equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// The three fields in triple order.
    pub fields: [FieldValue; 3],
    /// Fuzzy degree of truth, 1.0 for crisp facts.
    pub certainty: f64,
}

impl Fact {
    /// Creates a crisp fact.
    pub fn new(
        id: impl Into<FieldValue>,
        attribute: impl Into<FieldValue>,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self { fields: [id.into(), attribute.into(), value.into()], certainty: 1.0 }
    }

    /// Returns a copy carrying the given certainty.
    pub fn with_certainty(mut self, certainty: f64) -> Self {
        self.certainty = certainty;
        self
    }

    /// Field at the given position.
    pub fn field(&self, index: FieldIndex) -> &FieldValue {
        &self.fields[index.position()]
    }

    /// Key used to deduplicate facts by value. Certainty does not participate.
    pub fn triple(&self) -> &[FieldValue; 3] {
        &self.fields
    }
}

impl Index<FieldIndex> for Fact {
    type Output = FieldValue;

    fn index(&self, index: FieldIndex) -> &Self::Output {
        self.field(index)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.fields[0], self.fields[1], self.fields[2])
    }
}
