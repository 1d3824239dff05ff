//! The engine facade: working memory, productions and queries

use crate::compile::Planner;
use crate::config::{AlphaStrategy, EngineConfig};
use crate::error::{ReteError, ReteResult};
use crate::explain::IncompleteMatch;
use crate::fuzzy::FuzzyVariable;
use crate::network::{Network, NetworkStats, NodeId, ProductionLayout};
use crate::production::{Bindings, Match, MatchDelta};
use ahash::AHashMap;
use ripple_types::{AggregateComputation, Fact, FactId, FieldValue, GenericCondition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const QUERY_PRODUCTION: &str = "#query";

/// Handle returned when a production is compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductionId(pub NodeId);

impl fmt::Display for ProductionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "production {}", self.0)
    }
}

/// Working memory plus the matching network built over it
#[derive(Debug)]
pub struct ReteEngine {
    config: EngineConfig,
    network: Network,
    working_memory: Vec<FactId>,
    by_value: AHashMap<[FieldValue; 3], FactId>,
    productions: Vec<ProductionId>,
    fuzzy: AHashMap<String, Arc<dyn FuzzyVariable>>,
    aggregates: AHashMap<String, Arc<dyn AggregateComputation>>,
}

impl ReteEngine {
    #[instrument]
    pub fn new() -> Self {
        info!("Creating new Rete engine");
        Self::build(EngineConfig::default())
    }

    #[instrument]
    pub fn with_config(config: EngineConfig) -> ReteResult<Self> {
        config.validate()?;
        if config.alpha_strategy == AlphaStrategy::Hashed {
            return Err(ReteError::Unsupported { feature: "hashed alpha memories".to_string() });
        }
        info!(?config, "Creating Rete engine with custom configuration");
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        Self {
            network: Network::new(&config),
            config,
            working_memory: Vec::new(),
            by_value: AHashMap::new(),
            productions: Vec::new(),
            fuzzy: AHashMap::new(),
            aggregates: AHashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- working memory ----------------------------------------------------------------------

    /// Insert a fact unless an equal triple is already live; returns the live fact's id
    #[instrument(skip(self, fact), fields(fact = %fact))]
    pub fn insert_fact(&mut self, fact: Fact) -> ReteResult<FactId> {
        if let Some(existing) = self.by_value.get(fact.triple()) {
            debug!(fact_id = %existing, "Fact already in working memory");
            return Ok(*existing);
        }
        let key = fact.triple().clone();
        let id = self.network.create_fact(fact);
        self.working_memory.push(id);
        self.by_value.insert(key, id);
        self.network.alpha_activate(id, true)?;
        debug!(fact_id = %id, working_memory = self.working_memory.len(), "Fact inserted");
        Ok(id)
    }

    /// Insert `(id attribute value)` with the configured default certainty
    pub fn add(
        &mut self,
        id: impl Into<FieldValue>,
        attribute: impl Into<FieldValue>,
        value: impl Into<FieldValue>,
    ) -> ReteResult<FactId> {
        let fact = Fact::new(id, attribute, value).with_certainty(self.config.default_certainty);
        self.insert_fact(fact)
    }

    /// Retract a fact by identity
    #[instrument(skip(self))]
    pub fn remove_fact(&mut self, fact_id: FactId) -> ReteResult<()> {
        let position = self
            .working_memory
            .iter()
            .position(|id| *id == fact_id)
            .ok_or(ReteError::FactNotInWorkingMemory { fact_id })?;
        self.network.alpha_activate(fact_id, false)?;
        self.working_memory.remove(position);
        let fact = self.network.drop_fact(fact_id)?;
        self.by_value.remove(fact.triple());
        debug!(fact_id = %fact_id, working_memory = self.working_memory.len(), "Fact removed");
        Ok(())
    }

    pub fn fact(&self, fact_id: FactId) -> ReteResult<&Fact> {
        self.network.fact(fact_id)
    }

    /// Live fact with exactly this triple
    pub fn find_fact(
        &self,
        id: impl Into<FieldValue>,
        attribute: impl Into<FieldValue>,
        value: impl Into<FieldValue>,
    ) -> Option<FactId> {
        let key: [FieldValue; 3] = [id.into(), attribute.into(), value.into()];
        self.by_value.get(&key).copied()
    }

    /// Working memory in insertion order
    pub fn facts(&self) -> impl Iterator<Item = (FactId, &Fact)> + '_ {
        self.working_memory
            .iter()
            .filter_map(|id| self.network.fact(*id).ok().map(|fact| (*id, fact)))
    }

    // ---- extension registries ----------------------------------------------------------------

    /// Make conditions on `variable.name()` with one of its fuzzy values compile to membership tests
    pub fn register_fuzzy_variable(&mut self, variable: Arc<dyn FuzzyVariable>) {
        info!(variable = variable.name(), "Registering fuzzy variable");
        self.fuzzy.insert(variable.name().to_string(), variable);
    }

    pub fn fuzzy_variable(&self, name: &str) -> Option<&Arc<dyn FuzzyVariable>> {
        self.fuzzy.get(name)
    }

    /// Make a named aggregate resolvable; takes precedence over built-ins
    pub fn register_aggregate(
        &mut self,
        name: impl Into<String>,
        computation: Arc<dyn AggregateComputation>,
    ) {
        let name = name.into();
        info!(name = %name, "Registering aggregate computation");
        self.aggregates.insert(name, computation);
    }

    // ---- productions -------------------------------------------------------------------------

    #[instrument(skip(self, conditions), fields(conditions = conditions.len()))]
    pub fn add_production(
        &mut self,
        name: &str,
        conditions: Vec<GenericCondition>,
    ) -> ReteResult<ProductionId> {
        let planner = Planner { fuzzy: &self.fuzzy, aggregates: &self.aggregates };
        let plan = planner.plan(&conditions)?;
        let node = self.network.build_production(name, plan, &self.working_memory)?;
        let id = ProductionId(node);
        self.productions.push(id);
        let matches = self.network.production(node)?.items.len();
        info!(production = %id, name, matches, "Production added");
        Ok(id)
    }

    #[instrument(skip(self))]
    pub fn remove_production(&mut self, production: ProductionId) -> ReteResult<()> {
        self.network.remove_production(production.0)?;
        self.productions.retain(|id| *id != production);
        info!(production = %production, "Production removed");
        Ok(())
    }

    pub fn production_by_name(&self, name: &str) -> Option<ProductionId> {
        self.productions.iter().copied().find(|id| {
            self.network.production(id.0).is_ok_and(|production| production.name == name)
        })
    }

    pub fn production_name(&self, production: ProductionId) -> ReteResult<&str> {
        Ok(&self.network.production(production.0)?.name)
    }

    pub fn productions(&self) -> &[ProductionId] {
        &self.productions
    }

    /// Current complete matches, most recent first
    pub fn matches(&self, production: ProductionId) -> ReteResult<Vec<Match>> {
        self.network.matches(production.0)
    }

    /// Current matches projected onto the production's variables
    pub fn bindings(&self, production: ProductionId) -> ReteResult<Vec<Bindings>> {
        let layout = &self.network.production(production.0)?.bindings;
        let names: Vec<&str> = layout.iter().map(|(name, _)| name.as_str()).collect();
        self.matches(production)?.iter().map(|m| m.project(layout, &names)).collect()
    }

    /// Matches gained and lost since the last committing diff
    pub fn diff(&mut self, production: ProductionId, commit: bool) -> ReteResult<MatchDelta> {
        self.network.diff(production.0, commit)
    }

    /// Pending delta without consuming it
    pub fn peek(&self, production: ProductionId) -> ReteResult<MatchDelta> {
        self.network.pending_diff(production.0)
    }

    /// Whether the production gained a match since the last commit
    pub fn will_fire(&self, production: ProductionId) -> ReteResult<bool> {
        Ok(!self.peek(production)?.added.is_empty())
    }

    // ---- queries -----------------------------------------------------------------------------

    /// Compile the conditions, read their matches and discard the network again
    #[instrument(skip(self, conditions), fields(conditions = conditions.len()))]
    pub fn query(
        &mut self,
        conditions: Vec<GenericCondition>,
        outputs: &[&str],
    ) -> ReteResult<Vec<Bindings>> {
        let planner = Planner { fuzzy: &self.fuzzy, aggregates: &self.aggregates };
        let plan = planner.plan(&conditions)?;
        if let Some(missing) = outputs.iter().find(|o| plan.bindings.iter().all(|(n, _)| n != *o)) {
            return Err(ReteError::UnknownOutputVariable { variable: missing.to_string() });
        }
        let layout = plan.bindings.clone();

        let production = self.network.build_production(QUERY_PRODUCTION, plan, &self.working_memory)?;
        let delta = self.network.diff(production, true);
        let removal = self.network.remove_production(production);
        let delta = delta?;
        removal?;

        let rows = delta
            .added
            .iter()
            .map(|m| m.project(&layout, outputs))
            .collect::<ReteResult<Vec<_>>>()?;
        debug!(rows = rows.len(), "Query answered");
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub fn incomplete_matches(&self, production: ProductionId) -> ReteResult<Vec<IncompleteMatch>> {
        self.network.incomplete_matches(production.0)
    }

    // ---- introspection -----------------------------------------------------------------------

    pub fn stats(&self) -> NetworkStats {
        NetworkStats { working_memory: self.working_memory.len(), ..self.network.stats() }
    }

    pub fn layout(&self, production: ProductionId) -> ReteResult<ProductionLayout> {
        self.network.layout(production.0)
    }
}

impl Default for ReteEngine {
    fn default() -> Self {
        Self::new()
    }
}
