//! Alpha network: the shared trie of single-fact tests
//!
//! ```text
//! root ─┬─ attr == on ─┬─ val == table ──▶ [alpha memory]
//!       │              └─ id == val ─────▶ [alpha memory]
//!       └─ attr == color ───────────────▶ [alpha memory]
//! ```
//!
//! Each path from the root spells the single-fact tests of one condition;
//! conditions with a common test prefix share the path. Children are
//! indexed by [`TestKey`] so lookups during compilation are hash probes.

use crate::error::{ReteError, ReteResult};
use crate::network::{Network, NodeId};
use ahash::AHashMap;
use ripple_types::{ArithTest, Fact, FactId, FactPredicate, FieldIndex};
use std::sync::Arc;
use tracing::{debug, trace};

/// What a test node checks
#[derive(Debug, Clone)]
pub enum TestKind {
    /// Accepts everything; only the root has this kind
    Root,
    /// Field equals a literal
    ConstEq { field: FieldIndex, value: String },
    /// Two fields of the same fact are equal
    IntraEq { first: FieldIndex, second: FieldIndex },
    /// Pluggable predicate, may rewrite the fact
    Custom(Arc<dyn FactPredicate>),
}

/// Sharing key of a test node among its siblings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TestKey {
    Const(FieldIndex, String),
    Intra(FieldIndex, FieldIndex),
    Custom(String),
}

impl TestKind {
    pub fn key(&self) -> Option<TestKey> {
        match self {
            TestKind::Root => None,
            TestKind::ConstEq { field, value } => Some(TestKey::Const(*field, value.clone())),
            TestKind::IntraEq { first, second } => Some(TestKey::Intra(*first, *second)),
            TestKind::Custom(predicate) => Some(TestKey::Custom(predicate.key())),
        }
    }

    pub fn accepts(&self, fact: &Fact) -> bool {
        match self {
            TestKind::Root => true,
            TestKind::ConstEq { field, value } => fact.field(*field).is_symbol(value),
            TestKind::IntraEq { first, second } => fact.field(*first) == fact.field(*second),
            TestKind::Custom(predicate) => predicate.accepts(fact),
        }
    }
}

#[derive(Debug)]
pub struct TestNode {
    pub id: NodeId,
    pub kind: TestKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub index: AHashMap<TestKey, NodeId>,
    /// Alpha memory fed by this node, if a condition ends here
    pub memory: Option<NodeId>,
}

impl TestNode {
    pub fn new(id: NodeId, kind: TestKind, parent: Option<NodeId>) -> Self {
        Self { id, kind, parent, children: Vec::new(), index: AHashMap::new(), memory: None }
    }
}

/// Who feeds an alpha memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOwner {
    /// Terminal test node of a condition
    TestNode(NodeId),
    /// Aggregate node publishing its result facts
    Aggregate(NodeId),
    /// The permanent memory holding the negation placeholder fact
    Dummy,
}

#[derive(Debug)]
pub struct AlphaMemory {
    pub id: NodeId,
    /// Most recent first
    pub items: Vec<FactId>,
    /// Join nodes, deepest first
    pub successors: Vec<NodeId>,
    pub owner: MemoryOwner,
}

impl AlphaMemory {
    pub fn new(id: NodeId, owner: MemoryOwner) -> Self {
        Self { id, items: Vec::new(), successors: Vec::new(), owner }
    }
}

/// Tests of one condition, in trie order
#[derive(Debug, Clone, Default)]
pub struct AlphaSpec {
    pub tests: Vec<TestKind>,
}

/// Arithmetic test whose variables all live in the tested fact.
///
/// Variables are renamed after the field they read (`id`, `attr`, `val`) so
/// that equivalent tests from differently named conditions share a node.
#[derive(Debug, Clone)]
pub struct FieldTest {
    test: ArithTest,
}

impl FieldTest {
    pub fn new(test: &ArithTest, position_of: impl Fn(&str) -> Option<FieldIndex>) -> Self {
        let renamed = test.rename_vars(&|name| match position_of(name) {
            Some(field) => field.to_string(),
            None => name.to_string(),
        });
        Self { test: renamed }
    }
}

impl FactPredicate for FieldTest {
    fn key(&self) -> String {
        format!("arith:{}", self.test)
    }

    fn accepts(&self, fact: &Fact) -> bool {
        let result = self.test.evaluate(|name| {
            FieldIndex::ALL
                .into_iter()
                .find(|field| field.to_string() == name)
                .map(|field| fact.field(field).clone())
        });
        result.unwrap_or(false)
    }
}

impl Network {
    /// Push a fact through the test trie from the root
    pub(crate) fn alpha_activate(&mut self, fact: FactId, is_add: bool) -> ReteResult<()> {
        self.test_activate(self.root, fact, is_add)
    }

    fn test_activate(&mut self, node: NodeId, fact: FactId, is_add: bool) -> ReteResult<()> {
        let test = self.test_node(node)?;
        let kind = test.kind.clone();
        let memory = test.memory;
        let mut children = test.children.clone();

        let value = self.fact(fact)?;
        if !kind.accepts(value) {
            return Ok(());
        }
        if self.trace {
            trace!(node_id = %node, fact_id = %fact, is_add, "Test node passed");
        }

        let propagated = match &kind {
            TestKind::Custom(predicate) if is_add => match predicate.transform(value) {
                Some(rewritten) => {
                    let id = self.create_fact(rewritten);
                    self.derived.insert((fact, node), id);
                    id
                }
                None => fact,
            },
            TestKind::Custom(_) => self.derived.get(&(fact, node)).copied().unwrap_or(fact),
            _ => fact,
        };

        if is_add {
            if let Some(memory) = memory {
                self.alpha_memory_activate(memory, propagated, true)?;
            }
            for child in children {
                self.test_activate(child, propagated, true)?;
            }
        } else {
            children.reverse();
            for child in children {
                self.test_activate(child, propagated, false)?;
            }
            if let Some(memory) = memory {
                self.alpha_memory_activate(memory, propagated, false)?;
            }
            if propagated != fact {
                self.derived.remove(&(fact, node));
                self.drop_fact(propagated)?;
            }
        }
        Ok(())
    }

    /// Add or remove a fact and right-activate the memory's join nodes
    pub(crate) fn alpha_memory_activate(
        &mut self,
        memory: NodeId,
        fact: FactId,
        is_add: bool,
    ) -> ReteResult<()> {
        if is_add {
            let alpha = self.alpha_memory_mut(memory)?;
            alpha.items.insert(0, fact);
            let successors = alpha.successors.clone();
            for join in successors {
                self.join_right_activate(join, fact, true)?;
            }
        } else {
            let alpha = self.alpha_memory(memory)?;
            if !alpha.items.contains(&fact) {
                debug!(alpha_memory = %memory, fact_id = %fact, "Fact already gone from alpha memory");
                return Ok(());
            }
            let successors: Vec<NodeId> = alpha.successors.iter().rev().copied().collect();
            for join in successors {
                self.join_right_activate(join, fact, false)?;
            }
            self.alpha_memory_mut(memory)?.items.retain(|f| *f != fact);
        }
        Ok(())
    }

    /// Find or build the test path for `spec` and the alpha memory at its end
    pub(crate) fn build_or_share_alpha_memory(
        &mut self,
        spec: &AlphaSpec,
        working_memory: &[FactId],
    ) -> ReteResult<NodeId> {
        let mut current = self.root;
        let mut path = Vec::with_capacity(spec.tests.len());
        for kind in &spec.tests {
            let key = kind.key().ok_or_else(|| ReteError::InvalidCondition {
                message: "root test inside a condition".to_string(),
            })?;
            let existing = self.test_node(current)?.index.get(&key).copied();
            current = match existing {
                Some(child) => child,
                None => {
                    let child = self.next_node_id();
                    self.test_nodes.insert(child, TestNode::new(child, kind.clone(), Some(current)));
                    let parent = self.test_node_mut(current)?;
                    parent.children.push(child);
                    parent.index.insert(key, child);
                    debug!(node_id = %child, parent = %current, ?kind, "Created test node");
                    child
                }
            };
            path.push(current);
        }

        if let Some(memory) = self.test_node(current)?.memory {
            debug!(alpha_memory = %memory, "Sharing alpha memory");
            return Ok(memory);
        }

        let memory = self.next_node_id();
        self.alpha_memories.insert(memory, AlphaMemory::new(memory, MemoryOwner::TestNode(current)));
        self.test_node_mut(current)?.memory = Some(memory);

        for fact in working_memory {
            if let Some(propagated) = self.replay_through(&path, *fact)? {
                self.alpha_memory_mut(memory)?.items.insert(0, propagated);
            }
        }
        debug!(
            alpha_memory = %memory,
            test_node = %current,
            facts = self.alpha_memory(memory)?.items.len(),
            "Created alpha memory"
        );
        Ok(memory)
    }

    /// Run one fact down a single test path, reusing rewrites already recorded
    fn replay_through(&mut self, path: &[NodeId], fact: FactId) -> ReteResult<Option<FactId>> {
        let mut current = fact;
        for node in path {
            let kind = self.test_node(*node)?.kind.clone();
            let value = self.fact(current)?;
            if !kind.accepts(value) {
                return Ok(None);
            }
            if let TestKind::Custom(predicate) = &kind {
                if let Some(derived) = self.derived.get(&(current, *node)) {
                    current = *derived;
                } else if let Some(rewritten) = predicate.transform(value) {
                    let id = self.create_fact(rewritten);
                    self.derived.insert((current, *node), id);
                    current = id;
                }
            }
        }
        Ok(Some(current))
    }

    /// Delete an alpha memory with no successors and prune its bare test path
    pub(crate) fn release_alpha_memory(&mut self, memory: NodeId) -> ReteResult<()> {
        let alpha = self.delete_alpha_memory(memory)?;
        if let MemoryOwner::TestNode(node) = alpha.owner {
            self.test_node_mut(node)?.memory = None;
            self.prune_test_path(node)?;
        }
        Ok(())
    }

    pub(crate) fn delete_alpha_memory(&mut self, memory: NodeId) -> ReteResult<AlphaMemory> {
        let references = self.alpha_memory(memory)?.successors.len();
        if references > 0 {
            return Err(ReteError::NodeStillReferenced {
                node_id: memory,
                node_kind: "alpha memory",
                references,
            });
        }
        let alpha = self
            .alpha_memories
            .remove(&memory)
            .ok_or_else(|| ReteError::missing_node(memory, "alpha memory"))?;
        debug!(alpha_memory = %memory, "Released alpha memory");
        Ok(alpha)
    }

    fn prune_test_path(&mut self, mut node: NodeId) -> ReteResult<()> {
        while node != self.root {
            let test = self.test_node(node)?;
            if !test.children.is_empty() || test.memory.is_some() {
                break;
            }
            let test = self
                .test_nodes
                .remove(&node)
                .ok_or_else(|| ReteError::missing_node(node, "test"))?;
            let parent = test.parent.ok_or_else(|| ReteError::missing_node(node, "test parent"))?;
            let parent_node = self.test_node_mut(parent)?;
            parent_node.children.retain(|c| *c != node);
            if let Some(key) = test.kind.key() {
                parent_node.index.remove(&key);
            }

            let stale: Vec<(FactId, NodeId)> =
                self.derived.keys().filter(|(_, n)| *n == node).copied().collect();
            for key in stale {
                if let Some(derived) = self.derived.remove(&key) {
                    self.drop_fact(derived)?;
                }
            }
            debug!(node_id = %node, "Released test node");
            node = parent;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use ripple_types::{ArithExpr, CompOp};

    fn const_spec(attr: &str) -> AlphaSpec {
        AlphaSpec {
            tests: vec![TestKind::ConstEq { field: FieldIndex::Attribute, value: attr.to_string() }],
        }
    }

    #[test]
    fn test_shared_path_and_memory() {
        let mut network = Network::new(&EngineConfig::default());
        let a = network.build_or_share_alpha_memory(&const_spec("on"), &[]).unwrap();
        let b = network.build_or_share_alpha_memory(&const_spec("on"), &[]).unwrap();
        let c = network.build_or_share_alpha_memory(&const_spec("color"), &[]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(network.test_node(network.root).unwrap().children.len(), 2);
    }

    #[test]
    fn test_memory_replays_existing_facts() {
        let mut network = Network::new(&EngineConfig::default());
        let on = network.create_fact(Fact::new("B1", "on", "B2"));
        let color = network.create_fact(Fact::new("B1", "color", "red"));
        let memory = network.build_or_share_alpha_memory(&const_spec("on"), &[on, color]).unwrap();
        assert_eq!(network.alpha_memory(memory).unwrap().items, vec![on]);
    }

    #[test]
    fn test_activation_and_intra_equality() {
        let mut network = Network::new(&EngineConfig::default());
        let spec = AlphaSpec {
            tests: vec![
                TestKind::ConstEq { field: FieldIndex::Attribute, value: "on".to_string() },
                TestKind::IntraEq { first: FieldIndex::Id, second: FieldIndex::Value },
            ],
        };
        let memory = network.build_or_share_alpha_memory(&spec, &[]).unwrap();
        let same = network.create_fact(Fact::new("B1", "on", "B1"));
        let other = network.create_fact(Fact::new("B1", "on", "B2"));
        network.alpha_activate(same, true).unwrap();
        network.alpha_activate(other, true).unwrap();
        assert_eq!(network.alpha_memory(memory).unwrap().items, vec![same]);

        network.alpha_activate(same, false).unwrap();
        assert!(network.alpha_memory(memory).unwrap().items.is_empty());
    }

    #[test]
    fn test_field_test_keys_ignore_variable_names() {
        let y = ArithTest::new(ArithExpr::var("y"), CompOp::Gt, ArithExpr::Number(2.0));
        let b = ArithTest::new(ArithExpr::var("b"), CompOp::Gt, ArithExpr::Number(2.0));
        let first = FieldTest::new(&y, |_| Some(FieldIndex::Value));
        let second = FieldTest::new(&b, |_| Some(FieldIndex::Value));
        assert_eq!(first.key(), second.key());
        assert!(first.accepts(&Fact::new("B1", "val", "3")));
        assert!(!first.accepts(&Fact::new("B1", "val", "1")));
    }

    #[test]
    fn test_release_prunes_unused_path() {
        let mut network = Network::new(&EngineConfig::default());
        let memory = network.build_or_share_alpha_memory(&const_spec("on"), &[]).unwrap();
        network.release_alpha_memory(memory).unwrap();
        assert_eq!(network.test_nodes.len(), 1, "only the root remains");
        assert!(network.test_node(network.root).unwrap().index.is_empty());
    }
}
