//! Engine configuration
//!
//! Configuration is plain data with sensible defaults. It can be built in
//! code, parsed from JSON or read from `RIPPLE_*` environment variables.

use crate::error::{ReteError, ReteResult};
use serde::{Deserialize, Serialize};
use std::env;

/// How alpha memories are constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlphaStrategy {
    /// Shared test-node trie feeding alpha memories
    #[default]
    Dataflow,
    /// Memories indexed directly by constant fields (not implemented)
    Hashed,
}

/// Settings for a [`ReteEngine`](crate::ReteEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Alpha memory construction strategy
    pub alpha_strategy: AlphaStrategy,
    /// Certainty given to facts built by `ReteEngine::add`
    pub default_certainty: f64,
    /// Symbol filling the placeholder fact at negation positions
    pub dummy_symbol: String,
    /// Emit a trace event for every node activation
    pub trace_activations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alpha_strategy: AlphaStrategy::Dataflow,
            default_certainty: 1.0,
            dummy_symbol: "#dummy".to_string(),
            trace_activations: false,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON; missing keys take their defaults
    pub fn from_json(json: &str) -> ReteResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ReteError::configuration("json", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read overrides from `RIPPLE_ALPHA_STRATEGY`, `RIPPLE_DEFAULT_CERTAINTY`,
    /// `RIPPLE_DUMMY_SYMBOL` and `RIPPLE_TRACE_ACTIVATIONS`
    pub fn from_env() -> ReteResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ReteResult<Self> {
        let mut config = Self::default();

        if let Some(strategy) = lookup("RIPPLE_ALPHA_STRATEGY") {
            config.alpha_strategy = match strategy.to_ascii_lowercase().as_str() {
                "dataflow" => AlphaStrategy::Dataflow,
                "hashed" => AlphaStrategy::Hashed,
                other => {
                    return Err(ReteError::configuration(
                        "alpha_strategy",
                        format!("unknown strategy '{other}'"),
                    ));
                }
            };
        }
        if let Some(certainty) = lookup("RIPPLE_DEFAULT_CERTAINTY") {
            config.default_certainty = certainty
                .parse()
                .map_err(|_| ReteError::configuration("default_certainty", "not a number"))?;
        }
        if let Some(symbol) = lookup("RIPPLE_DUMMY_SYMBOL") {
            config.dummy_symbol = symbol;
        }
        if let Some(flag) = lookup("RIPPLE_TRACE_ACTIVATIONS") {
            config.trace_activations = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> ReteResult<()> {
        if !(0.0..=1.0).contains(&self.default_certainty) {
            return Err(ReteError::configuration(
                "default_certainty",
                format!("{} is outside [0, 1]", self.default_certainty),
            ));
        }
        if self.dummy_symbol.is_empty() {
            return Err(ReteError::configuration("dummy_symbol", "must not be empty"));
        }
        Ok(())
    }
}
