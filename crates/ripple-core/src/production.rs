//! Production nodes and match deltas

use crate::beta::Binding;
use crate::error::{ReteError, ReteResult};
use crate::network::{Network, NodeId};
use ahash::AHashSet;
use ripple_types::{Fact, FactId, FieldValue, TokenId};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

const OWNER_MARKER: &str = "#owner";

/// Variable name to value for one match
pub type Bindings = BTreeMap<String, FieldValue>;

/// Terminal of a production's chain
#[derive(Debug)]
pub struct ProductionNode {
    pub id: NodeId,
    pub name: String,
    pub parent: NodeId,
    /// Most recent first
    pub items: Vec<TokenId>,
    /// Matches as of the last committing diff
    pub committed: Vec<Match>,
    /// Top-level variables and where to read them
    pub bindings: Vec<(String, Binding)>,
}

/// A complete match, resolved to fact values so it stays readable after
/// its facts are retracted.
///
/// Two matches are equal when their chains hold the same triples level by
/// level. Aggregate result facts name their owner token; the owner is the
/// chain prefix itself, so it compares as a position marker.
#[derive(Debug, Clone)]
pub struct Match {
    entries: Vec<(FactId, Fact)>,
}

impl Match {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fact matched by condition `index`
    pub fn fact(&self, index: usize) -> Option<&Fact> {
        self.entries.get(index).map(|(_, fact)| fact)
    }

    pub fn fact_id(&self, index: usize) -> Option<FactId> {
        self.entries.get(index).map(|(id, _)| *id)
    }

    pub fn last(&self) -> Option<&Fact> {
        self.entries.last().map(|(_, fact)| fact)
    }

    pub fn fact_ids(&self) -> Vec<FactId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.entries.iter().map(|(_, fact)| fact)
    }

    /// Structural key of the chain
    pub fn key(&self) -> Vec<[FieldValue; 3]> {
        self.entries
            .iter()
            .map(|(_, fact)| {
                fact.triple().clone().map(|field| match field {
                    FieldValue::Token(_) => FieldValue::Symbol(OWNER_MARKER.to_string()),
                    other => other,
                })
            })
            .collect()
    }

    /// Read the requested variables out of this match
    pub fn project(&self, layout: &[(String, Binding)], outputs: &[&str]) -> ReteResult<Bindings> {
        let mut row = Bindings::new();
        for output in outputs {
            let binding = layout
                .iter()
                .find(|(name, _)| name == output)
                .map(|(_, binding)| *binding)
                .ok_or_else(|| ReteError::UnknownOutputVariable { variable: output.to_string() })?;
            let depth = self.entries.len();
            let out_of_bounds = ReteError::TokenIndexOutOfBounds { index: binding.level(), depth };
            let value = match binding {
                Binding::Field { level, field } => {
                    self.fact(level).ok_or(out_of_bounds)?.field(field).clone()
                }
                Binding::Fact { level } => FieldValue::Fact(self.fact_id(level).ok_or(out_of_bounds)?),
            };
            row.insert(output.to_string(), value);
        }
        Ok(row)
    }
}

impl PartialEq for Match {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Match {}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (_, fact)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{fact}")?;
        }
        Ok(())
    }
}

/// Matches gained and lost since the last commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchDelta {
    pub added: Vec<Match>,
    pub removed: Vec<Match>,
}

impl MatchDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl Network {
    pub(crate) fn production_activate(
        &mut self,
        production: NodeId,
        parent: Option<TokenId>,
        fact: FactId,
        is_add: bool,
    ) -> ReteResult<()> {
        if is_add {
            let token = self.tokens.create(parent, fact)?;
            self.production_mut(production)?.items.insert(0, token);
            return Ok(());
        }
        let node = self.production(production)?;
        let found = node.items.iter().copied().find(|t| self.tokens.is_link(*t, parent, fact));
        match found {
            Some(token) => {
                self.production_mut(production)?.items.retain(|t| *t != token);
                self.tokens.remove(token)?;
            }
            None => {
                debug!(production = %production, fact_id = %fact, "No match to retract");
            }
        }
        Ok(())
    }

    pub(crate) fn materialize(&self, token: TokenId) -> ReteResult<Match> {
        let ids = self.tokens.chain(Some(token))?;
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            entries.push((id, self.fact(id)?.clone()));
        }
        Ok(Match { entries })
    }

    pub fn matches(&self, production: NodeId) -> ReteResult<Vec<Match>> {
        let node = self.production(production)?;
        node.items.iter().map(|token| self.materialize(*token)).collect()
    }

    /// Symmetric difference between the current matches and the last commit
    pub fn pending_diff(&self, production: NodeId) -> ReteResult<MatchDelta> {
        let current = self.matches(production)?;
        let previous = &self.production(production)?.committed;

        let current_keys: AHashSet<Vec<[FieldValue; 3]>> = current.iter().map(Match::key).collect();
        let previous_keys: AHashSet<Vec<[FieldValue; 3]>> = previous.iter().map(Match::key).collect();

        let added = current.iter().filter(|m| !previous_keys.contains(&m.key())).cloned().collect();
        let removed = previous.iter().filter(|m| !current_keys.contains(&m.key())).cloned().collect();
        Ok(MatchDelta { added, removed })
    }

    pub fn diff(&mut self, production: NodeId, commit: bool) -> ReteResult<MatchDelta> {
        let delta = self.pending_diff(production)?;
        if commit {
            let current = self.matches(production)?;
            self.production_mut(production)?.committed = current;
        }
        Ok(delta)
    }
}
