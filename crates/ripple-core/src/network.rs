//! RETE network storage, activation dispatch and teardown
//!
//! Every node lives in an id-keyed arena owned by [`Network`]; nodes refer
//! to each other by [`NodeId`] only. Four arenas exist, one per role:
//!
//! ```text
//! test nodes ──▶ alpha memories ──▶ join nodes ──▶ beta nodes
//!  (trie)          (fact lists)      (emitters)    (memory / ncc / partner /
//!                                                   aggregate / production)
//! ```
//!
//! An *emitter* is anything that hands `(parent token, fact)` links to
//! child beta nodes: a join node, or an NCC node forwarding its unblocked
//! tokens. Additions visit children in list order, removals visit them in
//! reverse, and every node notifies its children before it forgets state.

use crate::aggregate::AggregateNode;
use crate::alpha::{AlphaMemory, MemoryOwner, TestKind, TestNode};
use crate::beta::{BetaMemory, Binding, JoinNode};
use crate::config::EngineConfig;
use crate::error::{ReteError, ReteResult};
use crate::ncc::{NccNode, NccPartner};
use crate::production::ProductionNode;
use crate::token::TokenStore;
use ahash::AHashMap;
use ripple_types::{Fact, FactId, FieldValue, TokenId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// Handle of a network node, unique within one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Nodes activated with `(parent token, fact)` links
#[derive(Debug)]
pub enum BetaNode {
    Memory(BetaMemory),
    Ncc(NccNode),
    Partner(NccPartner),
    Aggregate(AggregateNode),
    Production(ProductionNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BetaKind {
    Memory,
    Ncc,
    Partner,
    Aggregate,
    Production,
}

impl BetaNode {
    fn kind(&self) -> BetaKind {
        match self {
            BetaNode::Memory(_) => BetaKind::Memory,
            BetaNode::Ncc(_) => BetaKind::Ncc,
            BetaNode::Partner(_) => BetaKind::Partner,
            BetaNode::Aggregate(_) => BetaKind::Aggregate,
            BetaNode::Production(_) => BetaKind::Production,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            BetaNode::Memory(_) => "beta memory",
            BetaNode::Ncc(_) => "ncc node",
            BetaNode::Partner(_) => "ncc partner",
            BetaNode::Aggregate(_) => "aggregate node",
            BetaNode::Production(_) => "production node",
        }
    }

    /// The emitter feeding this node
    pub fn parent(&self) -> NodeId {
        match self {
            BetaNode::Memory(n) => n.parent,
            BetaNode::Ncc(n) => n.parent,
            BetaNode::Partner(n) => n.parent,
            BetaNode::Aggregate(n) => n.parent,
            BetaNode::Production(n) => n.parent,
        }
    }

    fn references(&self) -> usize {
        match self {
            BetaNode::Memory(n) => n.children.len(),
            BetaNode::Ncc(n) => n.children.len(),
            _ => 0,
        }
    }
}

/// Node and token counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NetworkStats {
    pub test_nodes: usize,
    pub alpha_memories: usize,
    pub join_nodes: usize,
    pub beta_memories: usize,
    pub ncc_nodes: usize,
    pub ncc_partners: usize,
    pub aggregate_nodes: usize,
    pub productions: usize,
    pub tokens: usize,
    pub facts: usize,
    pub working_memory: usize,
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network Statistics:")?;
        writeln!(f, "  Test nodes: {}", self.test_nodes)?;
        writeln!(f, "  Alpha memories: {}", self.alpha_memories)?;
        writeln!(f, "  Join nodes: {}", self.join_nodes)?;
        writeln!(f, "  Beta memories: {}", self.beta_memories)?;
        writeln!(f, "  NCC nodes/partners: {}/{}", self.ncc_nodes, self.ncc_partners)?;
        writeln!(f, "  Aggregate nodes: {}", self.aggregate_nodes)?;
        writeln!(f, "  Productions: {}", self.productions)?;
        writeln!(f, "  Tokens: {}", self.tokens)?;
        write!(f, "  Facts: {} ({} in working memory)", self.facts, self.working_memory)
    }
}

/// Node handles along the outer chain of one production, first condition first
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductionLayout {
    pub alpha_memories: Vec<NodeId>,
    pub join_nodes: Vec<NodeId>,
    pub beta_memories: Vec<NodeId>,
}

/// The matching network of one engine
#[derive(Debug)]
pub struct Network {
    pub(crate) facts: AHashMap<FactId, Fact>,
    pub(crate) tokens: TokenStore,
    pub(crate) test_nodes: AHashMap<NodeId, TestNode>,
    pub(crate) alpha_memories: AHashMap<NodeId, AlphaMemory>,
    pub(crate) joins: AHashMap<NodeId, JoinNode>,
    pub(crate) betas: AHashMap<NodeId, BetaNode>,
    /// Facts rewritten by custom test nodes, keyed by (incoming fact, test node)
    pub(crate) derived: AHashMap<(FactId, NodeId), FactId>,
    pub(crate) root: NodeId,
    pub(crate) dummy_memory: NodeId,
    pub(crate) dummy_fact: FactId,
    pub(crate) trace: bool,
    next_node_id: u64,
    next_fact_id: u64,
}

impl Network {
    pub fn new(config: &EngineConfig) -> Self {
        let mut network = Self {
            facts: AHashMap::new(),
            tokens: TokenStore::new(),
            test_nodes: AHashMap::new(),
            alpha_memories: AHashMap::new(),
            joins: AHashMap::new(),
            betas: AHashMap::new(),
            derived: AHashMap::new(),
            root: NodeId(0),
            dummy_memory: NodeId(0),
            dummy_fact: FactId(0),
            trace: config.trace_activations,
            next_node_id: 0,
            next_fact_id: 0,
        };

        let root = network.next_node_id();
        network.test_nodes.insert(root, TestNode::new(root, TestKind::Root, None));
        network.root = root;

        let symbol = config.dummy_symbol.as_str();
        let dummy_fact = network.create_fact(Fact::new(symbol, symbol, symbol));
        let dummy_memory = network.next_node_id();
        let mut memory = AlphaMemory::new(dummy_memory, MemoryOwner::Dummy);
        memory.items.push(dummy_fact);
        network.alpha_memories.insert(dummy_memory, memory);
        network.dummy_memory = dummy_memory;
        network.dummy_fact = dummy_fact;

        debug!(root = %root, dummy_memory = %dummy_memory, "Network initialised");
        network
    }

    pub(crate) fn next_node_id(&mut self) -> NodeId {
        self.next_node_id += 1;
        NodeId(self.next_node_id)
    }

    // ---- facts -------------------------------------------------------------------------------

    pub(crate) fn create_fact(&mut self, fact: Fact) -> FactId {
        self.next_fact_id += 1;
        let id = FactId(self.next_fact_id);
        self.facts.insert(id, fact);
        id
    }

    pub fn fact(&self, id: FactId) -> ReteResult<&Fact> {
        self.facts.get(&id).ok_or(ReteError::MissingFact { fact_id: id })
    }

    pub(crate) fn drop_fact(&mut self, id: FactId) -> ReteResult<Fact> {
        self.facts.remove(&id).ok_or(ReteError::MissingFact { fact_id: id })
    }

    /// Value of a variable binding inside a token chain
    pub(crate) fn binding_value(
        &self,
        token: Option<TokenId>,
        binding: Binding,
    ) -> ReteResult<FieldValue> {
        match binding {
            Binding::Field { level, field } => {
                let fact = self.tokens.fact_at(token, level)?;
                Ok(self.fact(fact)?.field(field).clone())
            }
            Binding::Fact { level } => Ok(FieldValue::Fact(self.tokens.fact_at(token, level)?)),
        }
    }

    // ---- node access -------------------------------------------------------------------------

    pub(crate) fn test_node(&self, id: NodeId) -> ReteResult<&TestNode> {
        self.test_nodes.get(&id).ok_or_else(|| ReteError::missing_node(id, "test"))
    }

    pub(crate) fn test_node_mut(&mut self, id: NodeId) -> ReteResult<&mut TestNode> {
        self.test_nodes.get_mut(&id).ok_or_else(|| ReteError::missing_node(id, "test"))
    }

    pub(crate) fn alpha_memory(&self, id: NodeId) -> ReteResult<&AlphaMemory> {
        self.alpha_memories.get(&id).ok_or_else(|| ReteError::missing_node(id, "alpha memory"))
    }

    pub(crate) fn alpha_memory_mut(&mut self, id: NodeId) -> ReteResult<&mut AlphaMemory> {
        self.alpha_memories.get_mut(&id).ok_or_else(|| ReteError::missing_node(id, "alpha memory"))
    }

    pub(crate) fn join(&self, id: NodeId) -> ReteResult<&JoinNode> {
        self.joins.get(&id).ok_or_else(|| ReteError::missing_node(id, "join"))
    }

    pub(crate) fn join_mut(&mut self, id: NodeId) -> ReteResult<&mut JoinNode> {
        self.joins.get_mut(&id).ok_or_else(|| ReteError::missing_node(id, "join"))
    }

    pub(crate) fn beta(&self, id: NodeId) -> ReteResult<&BetaNode> {
        self.betas.get(&id).ok_or_else(|| ReteError::missing_node(id, "beta"))
    }

    pub(crate) fn memory(&self, id: NodeId) -> ReteResult<&BetaMemory> {
        match self.betas.get(&id) {
            Some(BetaNode::Memory(m)) => Ok(m),
            _ => Err(ReteError::missing_node(id, "beta memory")),
        }
    }

    pub(crate) fn memory_mut(&mut self, id: NodeId) -> ReteResult<&mut BetaMemory> {
        match self.betas.get_mut(&id) {
            Some(BetaNode::Memory(m)) => Ok(m),
            _ => Err(ReteError::missing_node(id, "beta memory")),
        }
    }

    pub(crate) fn ncc(&self, id: NodeId) -> ReteResult<&NccNode> {
        match self.betas.get(&id) {
            Some(BetaNode::Ncc(n)) => Ok(n),
            _ => Err(ReteError::missing_node(id, "ncc")),
        }
    }

    pub(crate) fn ncc_mut(&mut self, id: NodeId) -> ReteResult<&mut NccNode> {
        match self.betas.get_mut(&id) {
            Some(BetaNode::Ncc(n)) => Ok(n),
            _ => Err(ReteError::missing_node(id, "ncc")),
        }
    }

    pub(crate) fn partner(&self, id: NodeId) -> ReteResult<&NccPartner> {
        match self.betas.get(&id) {
            Some(BetaNode::Partner(n)) => Ok(n),
            _ => Err(ReteError::missing_node(id, "ncc partner")),
        }
    }

    pub(crate) fn partner_mut(&mut self, id: NodeId) -> ReteResult<&mut NccPartner> {
        match self.betas.get_mut(&id) {
            Some(BetaNode::Partner(n)) => Ok(n),
            _ => Err(ReteError::missing_node(id, "ncc partner")),
        }
    }

    pub(crate) fn aggregate(&self, id: NodeId) -> ReteResult<&AggregateNode> {
        match self.betas.get(&id) {
            Some(BetaNode::Aggregate(n)) => Ok(n),
            _ => Err(ReteError::missing_node(id, "aggregate")),
        }
    }

    pub(crate) fn aggregate_mut(&mut self, id: NodeId) -> ReteResult<&mut AggregateNode> {
        match self.betas.get_mut(&id) {
            Some(BetaNode::Aggregate(n)) => Ok(n),
            _ => Err(ReteError::missing_node(id, "aggregate")),
        }
    }

    pub(crate) fn production(&self, id: NodeId) -> ReteResult<&ProductionNode> {
        match self.betas.get(&id) {
            Some(BetaNode::Production(n)) => Ok(n),
            _ => Err(ReteError::UnknownProduction { production_id: id }),
        }
    }

    pub(crate) fn production_mut(&mut self, id: NodeId) -> ReteResult<&mut ProductionNode> {
        match self.betas.get_mut(&id) {
            Some(BetaNode::Production(n)) => Ok(n),
            _ => Err(ReteError::UnknownProduction { production_id: id }),
        }
    }

    pub(crate) fn emitter_children(&self, id: NodeId) -> ReteResult<&Vec<NodeId>> {
        if let Some(join) = self.joins.get(&id) {
            return Ok(&join.children);
        }
        Ok(&self.ncc(id)?.children)
    }

    fn emitter_children_mut(&mut self, id: NodeId) -> ReteResult<&mut Vec<NodeId>> {
        if self.joins.contains_key(&id) {
            return Ok(&mut self.join_mut(id)?.children);
        }
        Ok(&mut self.ncc_mut(id)?.children)
    }

    // ---- activation --------------------------------------------------------------------------

    /// Hand a link to every child of an emitter
    pub(crate) fn emit(
        &mut self,
        emitter: NodeId,
        parent: Option<TokenId>,
        fact: FactId,
        is_add: bool,
    ) -> ReteResult<()> {
        let mut children = self.emitter_children(emitter)?.clone();
        if !is_add {
            children.reverse();
        }
        for child in children {
            self.beta_activate(child, parent, fact, is_add)?;
        }
        Ok(())
    }

    pub(crate) fn beta_activate(
        &mut self,
        node: NodeId,
        parent: Option<TokenId>,
        fact: FactId,
        is_add: bool,
    ) -> ReteResult<()> {
        if self.trace {
            trace!(node_id = %node, ?parent, fact_id = %fact, is_add, "Beta activation");
        }
        match self.beta(node)?.kind() {
            BetaKind::Memory => self.memory_activate(node, parent, fact, is_add),
            BetaKind::Ncc => self.ncc_activate(node, parent, fact, is_add),
            BetaKind::Partner => self.partner_activate(node, parent, fact, is_add),
            BetaKind::Aggregate => self.aggregate_activate(node, parent, fact, is_add),
            BetaKind::Production => self.production_activate(node, parent, fact, is_add),
        }
    }

    /// Connect a freshly built beta node and replay the emitter's current output into it
    pub(crate) fn attach_child(&mut self, emitter: NodeId, child: NodeId) -> ReteResult<()> {
        self.emitter_children_mut(emitter)?.push(child);

        if let Some(join) = self.joins.get(&emitter) {
            let alpha = join.alpha;
            let parent = join.parent;
            let level = join.level;
            let tests = join.tests.clone();
            let facts = self.alpha_memory(alpha)?.items.clone();
            let tokens: Vec<Option<TokenId>> = match parent {
                Some(memory) => self.memory(memory)?.items.iter().copied().map(Some).collect(),
                None => vec![None],
            };
            for fact in facts {
                for token in &tokens {
                    if self.join_tests_pass(&tests, level, *token, fact)? {
                        self.beta_activate(child, *token, fact, true)?;
                    }
                }
            }
        } else {
            let links = self.ncc_visible_links(emitter)?;
            for (parent, fact) in links {
                self.beta_activate(child, parent, fact, true)?;
            }
        }
        Ok(())
    }

    // ---- teardown ----------------------------------------------------------------------------

    /// Remove a beta node that has no children, then release upward
    pub(crate) fn release_beta(&mut self, id: NodeId) -> ReteResult<()> {
        let node = self.beta(id)?;
        let references = node.references();
        if references > 0 {
            return Err(ReteError::NodeStillReferenced {
                node_id: id,
                node_kind: node.kind_name(),
                references,
            });
        }
        let kind = node.kind_name();

        if let BetaNode::Ncc(ncc) = node {
            let partner = ncc.partner;
            let returned: Vec<TokenId> = ncc.results.values().flatten().copied().collect();
            self.partner_mut(partner)?.buffer.extend(returned);
        }

        let node = self.betas.remove(&id).ok_or_else(|| ReteError::missing_node(id, "beta"))?;
        let parent = node.parent();
        let mut partner = None;
        match node {
            BetaNode::Memory(memory) => self.drop_tokens(memory.items)?,
            BetaNode::Production(production) => self.drop_tokens(production.items)?,
            BetaNode::Partner(p) => self.drop_tokens(p.buffer)?,
            BetaNode::Ncc(ncc) => {
                self.drop_tokens(ncc.items)?;
                partner = Some(ncc.partner);
            }
            BetaNode::Aggregate(aggregate) => {
                for (_, group) in aggregate.groups {
                    self.drop_tokens(group.tokens)?;
                    if let Some(fact) = group.fact {
                        self.drop_fact(fact)?;
                    }
                }
                self.delete_alpha_memory(aggregate.memory)?;
            }
        }
        debug!(node_id = %id, kind, "Released beta node");

        self.emitter_children_mut(parent)?.retain(|child| *child != id);
        self.release_emitter_if_unused(parent)?;
        if let Some(partner) = partner {
            self.release_beta(partner)?;
        }
        Ok(())
    }

    fn drop_tokens(&mut self, tokens: Vec<TokenId>) -> ReteResult<()> {
        for token in tokens {
            self.tokens.remove(token)?;
        }
        Ok(())
    }

    fn release_emitter_if_unused(&mut self, id: NodeId) -> ReteResult<()> {
        if let Some(join) = self.joins.get(&id) {
            if join.children.is_empty() {
                self.release_join(id)?;
            }
            return Ok(());
        }
        if self.ncc(id)?.children.is_empty() {
            self.release_beta(id)?;
        }
        Ok(())
    }

    fn release_join(&mut self, id: NodeId) -> ReteResult<()> {
        let references = self.join(id)?.children.len();
        if references > 0 {
            return Err(ReteError::NodeStillReferenced {
                node_id: id,
                node_kind: "join node",
                references,
            });
        }
        let join = self.joins.remove(&id).ok_or_else(|| ReteError::missing_node(id, "join"))?;
        self.alpha_memory_mut(join.alpha)?.successors.retain(|s| *s != id);
        if let Some(memory) = join.parent {
            self.memory_mut(memory)?.children.retain(|c| *c != id);
        }
        debug!(node_id = %id, alpha_memory = %join.alpha, "Released join node");

        let alpha = self.alpha_memory(join.alpha)?;
        let unused = alpha.successors.is_empty();
        let owner = alpha.owner;
        match owner {
            MemoryOwner::TestNode(_) if unused => self.release_alpha_memory(join.alpha)?,
            MemoryOwner::Aggregate(aggregate) if unused => self.release_beta(aggregate)?,
            _ => {}
        }

        if let Some(memory) = join.parent {
            let unused = matches!(
                self.betas.get(&memory),
                Some(BetaNode::Memory(m)) if m.children.is_empty()
            );
            if unused {
                self.release_beta(memory)?;
            }
        }
        Ok(())
    }

    // ---- introspection -----------------------------------------------------------------------

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            test_nodes: self.test_nodes.len(),
            alpha_memories: self.alpha_memories.len(),
            join_nodes: self.joins.len(),
            tokens: self.tokens.len(),
            facts: self.facts.len(),
            ..NetworkStats::default()
        };
        for node in self.betas.values() {
            match node {
                BetaNode::Memory(_) => stats.beta_memories += 1,
                BetaNode::Ncc(_) => stats.ncc_nodes += 1,
                BetaNode::Partner(_) => stats.ncc_partners += 1,
                BetaNode::Aggregate(_) => stats.aggregate_nodes += 1,
                BetaNode::Production(_) => stats.productions += 1,
            }
        }
        stats
    }

    /// Walk a production's outer chain back to the top
    pub fn layout(&self, production: NodeId) -> ReteResult<ProductionLayout> {
        let mut layout = ProductionLayout::default();
        let mut emitter = Some(self.production(production)?.parent);
        while let Some(id) = emitter {
            if self.ncc(id).is_ok() {
                emitter = Some(self.ncc(id)?.parent);
                continue;
            }
            let join = self.join(id)?;
            layout.join_nodes.push(id);
            layout.alpha_memories.push(join.alpha);
            emitter = match join.parent {
                Some(memory) => {
                    layout.beta_memories.push(memory);
                    Some(self.memory(memory)?.parent)
                }
                None => None,
            };
        }
        layout.alpha_memories.reverse();
        layout.join_nodes.reverse();
        layout.beta_memories.reverse();
        Ok(layout)
    }
}
