#![allow(dead_code)]
//! Shared helpers for the integration tests

use ripple_core::Match;
use ripple_types::{Condition, Field, GenericCondition};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with_test_writer()
            .try_init();
    });
}

/// Parse one field: `<x>` is a variable, anything else a constant
pub fn field(text: &str) -> Field {
    match text.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
        Some(name) => Field::var(name),
        None => Field::constant(text),
    }
}

/// Condition from three field strings, e.g. `cond("<x>", "on", "<y>")`
pub fn cond(id: &str, attribute: &str, value: &str) -> Condition {
    Condition::new(field(id), field(attribute), field(value))
}

pub fn pattern(id: &str, attribute: &str, value: &str) -> GenericCondition {
    cond(id, attribute, value).into()
}

/// Matches rendered as strings, sorted for order-insensitive comparison
pub fn rendered(matches: &[Match]) -> Vec<String> {
    let mut out: Vec<String> = matches.iter().map(ToString::to_string).collect();
    out.sort();
    out
}
