//! Error handling for the Ripple matching network
//!
//! Errors fall into four groups: caller input rejected at compile time,
//! broken network invariants, unsupported feature requests, and bad
//! configuration. Expected misses during retraction are not errors; they
//! are logged where they happen.

use crate::network::NodeId;
use ripple_types::{FactId, TokenId};
use std::fmt;
use thiserror::Error;

/// Error type for engine and network operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReteError {
    /// A test or output refers to a variable no earlier condition binds
    #[error("Unbound variable <{variable}> in {context}")]
    UnboundVariable { variable: String, context: String },

    /// An aggregate names a computation the engine does not know
    #[error("Unknown aggregate computation '{name}'")]
    UnknownAggregate { name: String },

    /// A production body or nested condition list is empty
    #[error("Empty condition list in {context}")]
    EmptyConditions { context: String },

    /// A condition is malformed
    #[error("Invalid condition: {message}")]
    InvalidCondition { message: String },

    /// A query asks for a variable its conditions never bind
    #[error("Unknown output variable <{variable}>")]
    UnknownOutputVariable { variable: String },

    /// A node was removed while other nodes still reference it
    #[error("{node_kind} {node_id} still has {references} reference(s)")]
    NodeStillReferenced { node_id: NodeId, node_kind: &'static str, references: usize },

    /// Positional token access past the chain length
    #[error("Token index {index} out of bounds for chain of depth {depth}")]
    TokenIndexOutOfBounds { index: usize, depth: usize },

    /// A node handle does not resolve to a node of the expected kind
    #[error("Missing {expected} node {node_id}")]
    MissingNode { node_id: NodeId, expected: &'static str },

    /// A token handle does not resolve
    #[error("Missing token {token_id}")]
    MissingToken { token_id: TokenId },

    /// A fact handle does not resolve
    #[error("Missing fact {fact_id}")]
    MissingFact { fact_id: FactId },

    /// Removal of a fact that is not in working memory
    #[error("Fact {fact_id} is not in working memory")]
    FactNotInWorkingMemory { fact_id: FactId },

    /// A production handle does not resolve
    #[error("Unknown production {production_id}")]
    UnknownProduction { production_id: NodeId },

    /// A requested feature is deliberately not implemented
    #[error("Unsupported feature: {feature}")]
    Unsupported { feature: String },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error in '{setting}': {message}")]
    Configuration { setting: String, message: String },
}

impl ReteError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ReteError::UnboundVariable { .. }
            | ReteError::UnknownAggregate { .. }
            | ReteError::EmptyConditions { .. }
            | ReteError::InvalidCondition { .. }
            | ReteError::UnknownOutputVariable { .. } => "compile",
            ReteError::NodeStillReferenced { .. }
            | ReteError::TokenIndexOutOfBounds { .. }
            | ReteError::MissingNode { .. }
            | ReteError::MissingToken { .. }
            | ReteError::MissingFact { .. } => "invariant",
            ReteError::FactNotInWorkingMemory { .. } | ReteError::UnknownProduction { .. } => {
                "caller_state"
            }
            ReteError::Unsupported { .. } => "unsupported",
            ReteError::Configuration { .. } => "configuration",
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            "compile" | "caller_state" => ErrorSeverity::Medium,
            "unsupported" => ErrorSeverity::Low,
            "configuration" => ErrorSeverity::High,
            _ => ErrorSeverity::Critical,
        }
    }

    /// Whether the network is still consistent after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.severity(), ErrorSeverity::Critical)
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result type alias for network operations
pub type ReteResult<T> = Result<T, ReteError>;

/// Convenience constructors for common error scenarios
impl ReteError {
    /// Create an unbound variable error
    pub fn unbound(variable: &str, context: impl Into<String>) -> Self {
        Self::UnboundVariable { variable: variable.to_string(), context: context.into() }
    }

    /// Create an empty condition list error
    pub fn empty(context: impl Into<String>) -> Self {
        Self::EmptyConditions { context: context.into() }
    }

    /// Create a missing node error
    pub fn missing_node(node_id: NodeId, expected: &'static str) -> Self {
        Self::MissingNode { node_id, expected }
    }

    /// Create a configuration error
    pub fn configuration(setting: &str, message: impl Into<String>) -> Self {
        Self::Configuration { setting: setting.to_string(), message: message.into() }
    }
}
