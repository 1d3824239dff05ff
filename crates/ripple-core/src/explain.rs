//! Partial match reconstruction for productions that do not fire

use crate::aggregate::TOP_OWNER;
use crate::alpha::{MemoryOwner, TestKind};
use crate::beta::{JoinKind, JoinTest};
use crate::error::ReteResult;
use crate::network::{Network, NodeId};
use ripple_types::{Condition, Field, FieldIndex, FieldValue, TokenId};
use std::fmt;

/// Ground conditions matched so far, followed by the first unmatched
/// condition with everything the network knows about it filled in
#[derive(Debug, Clone)]
pub struct IncompleteMatch {
    pub conditions: Vec<Condition>,
}

impl fmt::Display for IncompleteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{condition}")?;
        }
        Ok(())
    }
}

impl Network {
    /// Explain how far a production without matches got.
    ///
    /// Walks the chain upward to the deepest beta memory holding tokens and
    /// describes each of those tokens. Empty when the production has matches.
    pub fn incomplete_matches(&self, production: NodeId) -> ReteResult<Vec<IncompleteMatch>> {
        let node = self.production(production)?;
        if !node.items.is_empty() {
            return Ok(Vec::new());
        }

        let mut emitter = node.parent;
        loop {
            if let Ok(ncc) = self.ncc(emitter) {
                emitter = ncc.parent;
                continue;
            }
            let join = self.join(emitter)?;
            let Some(memory) = join.parent else {
                return Ok(vec![self.describe(None, emitter)?]);
            };
            let memory = self.memory(memory)?;
            if !memory.items.is_empty() {
                return memory.items.iter().map(|token| self.describe(Some(*token), emitter)).collect();
            }
            emitter = memory.parent;
        }
    }

    fn describe(&self, token: Option<TokenId>, next: NodeId) -> ReteResult<IncompleteMatch> {
        let mut conditions = Vec::new();
        for fact in self.tokens.chain(token)? {
            if fact == self.dummy_fact {
                continue;
            }
            let [id, attribute, value] = self.fact(fact)?.triple().clone();
            // Aggregate results name internal tokens; the condition that
            // consumes them shows their value
            if matches!(value, FieldValue::Token(_)) || value.is_symbol(TOP_OWNER) {
                continue;
            }
            conditions.push(Condition::new(
                Field::constant(id.to_string()),
                Field::constant(attribute.to_string()),
                Field::constant(value.to_string()),
            ));
        }
        if self.join(next)?.kind == JoinKind::Pattern {
            conditions.push(self.reconstruct(token, next)?);
        }
        Ok(IncompleteMatch { conditions })
    }

    /// Rebuild the condition tested by a join from its alpha path and join tests
    fn reconstruct(&self, token: Option<TokenId>, join: NodeId) -> ReteResult<Condition> {
        let join = self.join(join)?;
        let mut known: [Option<String>; 3] = [None, None, None];
        let mut links: Vec<(FieldIndex, FieldIndex)> = Vec::new();

        if let MemoryOwner::TestNode(mut current) = self.alpha_memory(join.alpha)?.owner {
            while current != self.root {
                let test = self.test_node(current)?;
                match &test.kind {
                    TestKind::ConstEq { field, value } => known[field.position()] = Some(value.clone()),
                    TestKind::IntraEq { first, second } => links.push((*first, *second)),
                    TestKind::Root | TestKind::Custom(_) => {}
                }
                match test.parent {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }

        for test in join.tests.iter() {
            match test {
                JoinTest::FieldEq { field, level, other } => {
                    let earlier = self.fact(self.tokens.fact_at(token, *level)?)?;
                    known[field.position()] = Some(earlier.field(*other).to_string());
                }
                JoinTest::FactRef { field, level } => {
                    known[field.position()] = Some(self.tokens.fact_at(token, *level)?.to_string());
                }
                _ => {}
            }
        }

        // Equal fields share whatever one of them is known to hold
        let mut changed = true;
        while changed {
            changed = false;
            for (first, second) in &links {
                let (a, b) = (first.position(), second.position());
                if known[a].is_some() == known[b].is_some() {
                    continue;
                }
                let value = known[a].clone().or_else(|| known[b].clone());
                known[a] = value.clone();
                known[b] = value;
                changed = true;
            }
        }

        let mut fields: [Option<Field>; 3] = [None, None, None];
        let mut fresh = 0;
        for field in FieldIndex::ALL {
            let position = field.position();
            if fields[position].is_some() {
                continue;
            }
            let resolved = match &known[position] {
                Some(value) => Field::constant(value.clone()),
                None => {
                    let var = Field::var(format!("_{fresh}"));
                    fresh += 1;
                    for (first, second) in &links {
                        if *first == field {
                            fields[second.position()] = Some(var.clone());
                        } else if *second == field {
                            fields[first.position()] = Some(var.clone());
                        }
                    }
                    var
                }
            };
            fields[position] = Some(resolved);
        }
        let [id, attribute, value] = fields.map(|f| f.unwrap_or_else(|| Field::var("_")));
        Ok(Condition::new(id, attribute, value))
    }
}
