//! Beta network: join nodes and beta memories
//!
//! A join node pairs one alpha memory with the beta memory holding the
//! tokens for all earlier conditions (none for the first condition) and
//! emits every consistent `(token, fact)` link to its children. Beta
//! memories turn links into tokens and left-activate their own join nodes.

use crate::error::{ReteError, ReteResult};
use crate::network::{BetaNode, Network, NodeId};
use ahash::AHashMap;
use ripple_types::{ArithTest, Fact, FactId, FieldIndex, FieldValue, TokenId};
use std::sync::Arc;
use tracing::{debug, trace};

/// Where a variable's value lives in a token chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// A field of the fact matched at `level`
    Field { level: usize, field: FieldIndex },
    /// The fact matched at `level` itself
    Fact { level: usize },
}

impl Binding {
    pub fn level(&self) -> usize {
        match self {
            Binding::Field { level, .. } | Binding::Fact { level } => *level,
        }
    }
}

/// Consistency test between an incoming fact and the token it would extend
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTest {
    /// `fact.field == token[level].other`
    FieldEq { field: FieldIndex, level: usize, other: FieldIndex },
    /// `fact.field` references the fact at `token[level]`
    FactRef { field: FieldIndex, level: usize },
    /// Arithmetic over resolved variables
    Arith { test: ArithTest, locations: Vec<(String, Binding)> },
    /// The aggregate result fact belongs to exactly this token
    Owner,
    /// The aggregate result is not zero
    NonZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Pattern,
    Negation,
    AggregateGate,
}

#[derive(Debug)]
pub struct JoinNode {
    pub id: NodeId,
    pub kind: JoinKind,
    pub alpha: NodeId,
    /// Beta memory with the tokens for earlier conditions
    pub parent: Option<NodeId>,
    /// Depth of the tokens this join extends
    pub level: usize,
    pub tests: Arc<[JoinTest]>,
    pub children: Vec<NodeId>,
}

#[derive(Debug)]
pub struct BetaMemory {
    pub id: NodeId,
    pub parent: NodeId,
    /// Most recent first
    pub items: Vec<TokenId>,
    pub children: Vec<NodeId>,
}

impl Network {
    pub(crate) fn join_right_activate(
        &mut self,
        join: NodeId,
        fact: FactId,
        is_add: bool,
    ) -> ReteResult<()> {
        let node = self.join(join)?;
        let tests = node.tests.clone();
        let level = node.level;
        let tokens: Vec<Option<TokenId>> = match node.parent {
            Some(memory) => self.memory(memory)?.items.iter().copied().map(Some).collect(),
            None => vec![None],
        };
        if self.trace {
            trace!(node_id = %join, fact_id = %fact, is_add, tokens = tokens.len(), "Right activation");
        }
        for token in tokens {
            if self.join_tests_pass(&tests, level, token, fact)? {
                self.emit(join, token, fact, is_add)?;
            }
        }
        Ok(())
    }

    pub(crate) fn join_left_activate(
        &mut self,
        join: NodeId,
        token: TokenId,
        is_add: bool,
    ) -> ReteResult<()> {
        let node = self.join(join)?;
        let tests = node.tests.clone();
        let level = node.level;
        let facts = self.alpha_memory(node.alpha)?.items.clone();
        if self.trace {
            trace!(node_id = %join, token_id = %token, is_add, facts = facts.len(), "Left activation");
        }
        for fact in facts {
            if self.join_tests_pass(&tests, level, Some(token), fact)? {
                self.emit(join, Some(token), fact, is_add)?;
            }
        }
        Ok(())
    }

    pub(crate) fn join_tests_pass(
        &self,
        tests: &[JoinTest],
        level: usize,
        token: Option<TokenId>,
        fact: FactId,
    ) -> ReteResult<bool> {
        let current = self.fact(fact)?;
        for test in tests {
            if !self.join_test_passes(test, level, token, current)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn join_test_passes(
        &self,
        test: &JoinTest,
        level: usize,
        token: Option<TokenId>,
        current: &Fact,
    ) -> ReteResult<bool> {
        Ok(match test {
            JoinTest::FieldEq { field, level: earlier, other } => {
                let earlier = self.fact(self.tokens.fact_at(token, *earlier)?)?;
                current.field(*field) == earlier.field(*other)
            }
            JoinTest::FactRef { field, level: earlier } => {
                let earlier = self.tokens.fact_at(token, *earlier)?;
                *current.field(*field) == FieldValue::Fact(earlier)
            }
            JoinTest::Arith { test, locations } => {
                let mut values = AHashMap::with_capacity(locations.len());
                for (name, binding) in locations {
                    let value = match *binding {
                        Binding::Field { level: l, field } if l == level => {
                            current.field(field).clone()
                        }
                        other => self.binding_value(token, other)?,
                    };
                    values.insert(name.as_str(), value);
                }
                test.evaluate(|name| values.get(name).cloned())
                    .map_err(|_| ReteError::unbound(&test.to_string(), "join test"))?
            }
            JoinTest::Owner => match (token, current.field(FieldIndex::Value)) {
                (None, _) => true,
                (Some(token), FieldValue::Token(owner)) => *owner == token,
                _ => false,
            },
            JoinTest::NonZero => current.field(FieldIndex::Id).as_number().is_some_and(|n| n != 0.0),
        })
    }

    pub(crate) fn memory_activate(
        &mut self,
        memory: NodeId,
        parent: Option<TokenId>,
        fact: FactId,
        is_add: bool,
    ) -> ReteResult<()> {
        if is_add {
            let token = self.tokens.create(parent, fact)?;
            let node = self.memory_mut(memory)?;
            node.items.insert(0, token);
            let children = node.children.clone();
            for join in children {
                self.join_left_activate(join, token, true)?;
            }
            return Ok(());
        }

        let node = self.memory(memory)?;
        let found = node.items.iter().copied().find(|t| self.tokens.is_link(*t, parent, fact));
        let Some(token) = found else {
            debug!(beta_memory = %memory, fact_id = %fact, "No token to remove from beta memory");
            return Ok(());
        };
        let children: Vec<NodeId> = node.children.iter().rev().copied().collect();
        for join in children {
            self.join_left_activate(join, token, false)?;
        }
        self.memory_mut(memory)?.items.retain(|t| *t != token);
        self.tokens.remove(token)?;
        Ok(())
    }

    /// Reuse a pattern join with identical inputs and tests, or build one
    pub(crate) fn build_or_share_join(
        &mut self,
        parent: Option<NodeId>,
        alpha: NodeId,
        tests: Vec<JoinTest>,
        level: usize,
    ) -> ReteResult<NodeId> {
        let candidates = match parent {
            Some(memory) => self.memory(memory)?.children.clone(),
            None => self.alpha_memory(alpha)?.successors.clone(),
        };
        for candidate in candidates {
            let join = self.join(candidate)?;
            if join.kind == JoinKind::Pattern
                && join.alpha == alpha
                && join.parent == parent
                && *join.tests == *tests
            {
                debug!(join_node = %candidate, "Sharing join node");
                return Ok(candidate);
            }
        }
        self.create_join(JoinKind::Pattern, parent, alpha, tests, level)
    }

    /// Build an unshared join. Aggregate gates go first among their memory's
    /// children so they see an anchor token before its inner chain does.
    pub(crate) fn create_join(
        &mut self,
        kind: JoinKind,
        parent: Option<NodeId>,
        alpha: NodeId,
        tests: Vec<JoinTest>,
        level: usize,
    ) -> ReteResult<NodeId> {
        let id = self.next_node_id();
        self.joins.insert(
            id,
            JoinNode { id, kind, alpha, parent, level, tests: tests.into(), children: Vec::new() },
        );
        if let Some(memory) = parent {
            let children = &mut self.memory_mut(memory)?.children;
            match kind {
                JoinKind::AggregateGate => children.insert(0, id),
                _ => children.push(id),
            }
        }
        self.alpha_memory_mut(alpha)?.successors.insert(0, id);
        debug!(join_node = %id, ?kind, alpha_memory = %alpha, parent = ?parent, level, "Created join node");
        Ok(id)
    }

    /// The beta memory below an emitter, created and filled on first need
    pub(crate) fn build_or_share_beta_memory(&mut self, emitter: NodeId) -> ReteResult<NodeId> {
        for child in self.emitter_children(emitter)? {
            if let Some(BetaNode::Memory(memory)) = self.betas.get(child) {
                debug!(beta_memory = %memory.id, "Sharing beta memory");
                return Ok(memory.id);
            }
        }
        let id = self.next_node_id();
        self.betas.insert(
            id,
            BetaNode::Memory(BetaMemory {
                id,
                parent: emitter,
                items: Vec::new(),
                children: Vec::new(),
            }),
        );
        self.attach_child(emitter, id)?;
        debug!(
            beta_memory = %id,
            parent = %emitter,
            tokens = self.memory(id)?.items.len(),
            "Created beta memory"
        );
        Ok(id)
    }
}
