//! Aggregate and existence subnetworks
//!
//! The aggregate node terminates an inner chain and groups its matches by
//! owner (the anchor token `levels` links up). After every change to a
//! group the value is recomputed from scratch and republished as a result
//! fact `(value, result_var, owner)` in a private alpha memory, whose gate
//! join routes it back to exactly that owner.

use crate::beta::Binding;
use crate::error::ReteResult;
use crate::network::{Network, NodeId};
use ahash::AHashMap;
use ripple_types::aggregate::fold_rows;
use ripple_types::{AggregateComputation, BindingRow, Fact, FactId, FieldValue, TokenId};
use std::sync::Arc;
use tracing::debug;

/// Owner field of a result fact produced for the empty anchor chain
pub const TOP_OWNER: &str = "#top";

#[derive(Debug, Default)]
pub struct AggregateGroup {
    pub tokens: Vec<TokenId>,
    /// Currently published result fact
    pub fact: Option<FactId>,
}

#[derive(Debug)]
pub struct AggregateNode {
    pub id: NodeId,
    /// Last emitter of the inner chain
    pub parent: NodeId,
    pub levels: usize,
    pub computation: Arc<dyn AggregateComputation>,
    pub result_var: String,
    /// Variables handed to the computation and where to read them
    pub row: Vec<(String, Binding)>,
    /// Private alpha memory holding the result facts
    pub memory: NodeId,
    pub groups: AHashMap<Option<TokenId>, AggregateGroup>,
}

impl Network {
    pub(crate) fn aggregate_activate(
        &mut self,
        aggregate: NodeId,
        parent: Option<TokenId>,
        fact: FactId,
        is_add: bool,
    ) -> ReteResult<()> {
        let levels = self.aggregate(aggregate)?.levels;
        let owner = self.tokens.ancestor(parent, levels - 1)?;

        if is_add {
            let token = self.tokens.create(parent, fact)?;
            self.aggregate_mut(aggregate)?.groups.entry(owner).or_default().tokens.push(token);
        } else {
            let found = self.aggregate(aggregate)?.groups.get(&owner).and_then(|group| {
                group.tokens.iter().copied().find(|t| self.tokens.is_link(*t, parent, fact))
            });
            let Some(token) = found else {
                debug!(aggregate_node = %aggregate, fact_id = %fact, "No inner match to remove");
                return Ok(());
            };
            if let Some(group) = self.aggregate_mut(aggregate)?.groups.get_mut(&owner) {
                group.tokens.retain(|t| *t != token);
            }
            self.tokens.remove(token)?;
        }
        self.recompute_group(aggregate, owner)
    }

    /// Replace the published result of one group
    fn recompute_group(&mut self, aggregate: NodeId, owner: Option<TokenId>) -> ReteResult<()> {
        let node = self.aggregate(aggregate)?;
        let computation = node.computation.clone();
        let memory = node.memory;
        let result_var = node.result_var.clone();
        let layout = node.row.clone();
        let (tokens, previous) = match node.groups.get(&owner) {
            Some(group) => (group.tokens.clone(), group.fact),
            None => (Vec::new(), None),
        };

        if let Some(previous) = previous {
            self.alpha_memory_activate(memory, previous, false)?;
            self.drop_fact(previous)?;
        }

        if tokens.is_empty() {
            self.aggregate_mut(aggregate)?.groups.remove(&owner);
            debug!(aggregate_node = %aggregate, ?owner, "Aggregate group emptied");
            return Ok(());
        }

        let mut rows = Vec::with_capacity(tokens.len());
        for token in &tokens {
            let mut row = BindingRow::with_capacity(layout.len());
            for (name, binding) in &layout {
                row.insert(name.clone(), self.binding_value(Some(*token), *binding)?);
            }
            rows.push(row);
        }
        let value = fold_rows(computation.as_ref(), &rows);

        let owner_field = match owner {
            Some(token) => FieldValue::Token(token),
            None => FieldValue::from(TOP_OWNER),
        };
        let result = self.create_fact(Fact::new(value.to_string(), result_var, owner_field));
        if let Some(group) = self.aggregate_mut(aggregate)?.groups.get_mut(&owner) {
            group.fact = Some(result);
        }
        debug!(
            aggregate_node = %aggregate,
            computation = %computation.name(),
            value,
            matches = tokens.len(),
            "Aggregate recomputed"
        );
        self.alpha_memory_activate(memory, result, true)
    }
}
