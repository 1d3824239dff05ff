//! Turning condition lists into network nodes
//!
//! Compilation runs in two phases. [`Planner`] resolves every variable,
//! aggregate name and fuzzy value into a [`Plan`] without touching the
//! network, so caller mistakes surface before any node exists. The network
//! then builds (or shares) the nodes for the plan and replays current
//! facts into whatever it had to create.
//!
//! Every step of a chain occupies one token level: a pattern stores its
//! matched fact, a negation the placeholder fact and an aggregate its
//! result fact.

use crate::aggregate::AggregateNode;
use crate::alpha::{AlphaMemory, AlphaSpec, FieldTest, MemoryOwner, TestKind};
use crate::beta::{Binding, JoinKind, JoinTest};
use crate::error::{ReteError, ReteResult};
use crate::fuzzy::{FuzzyMembership, FuzzyVariable};
use crate::ncc::{NccNode, NccPartner};
use crate::network::{BetaNode, Network, NodeId};
use crate::production::ProductionNode;
use ahash::AHashMap;
use ripple_types::aggregate::builtin;
use ripple_types::{
    AggregateComputation, AggregateSpec, ArithTest, Condition, Exists, FactId, Field, FieldIndex,
    GenericCondition,
};
use std::sync::Arc;
use tracing::debug;

/// Variable bound by an existence test; never visible to later conditions
pub const EXISTS_VAR: &str = "#exists";

/// Variables visible at one point of a chain, in binding order
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    vars: Vec<(String, Binding)>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Option<Binding> {
        self.vars.iter().find(|(var, _)| var == name).map(|(_, binding)| *binding)
    }

    fn bind(&mut self, name: &str, binding: Binding) {
        self.vars.push((name.to_string(), binding));
    }

    pub fn into_bindings(self) -> Vec<(String, Binding)> {
        self.vars
    }
}

/// One level of a chain
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Pattern {
        alpha: AlphaSpec,
        tests: Vec<JoinTest>,
    },
    Negation {
        inner: Vec<Step>,
    },
    Aggregate {
        inner: Vec<Step>,
        computation: Arc<dyn AggregateComputation>,
        result_var: String,
        row: Vec<(String, Binding)>,
        nonzero: bool,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub steps: Vec<Step>,
    /// Top-level variables and where a complete match holds them
    pub bindings: Vec<(String, Binding)>,
}

/// Resolves conditions against the engine's registries
pub(crate) struct Planner<'a> {
    pub fuzzy: &'a AHashMap<String, Arc<dyn FuzzyVariable>>,
    pub aggregates: &'a AHashMap<String, Arc<dyn AggregateComputation>>,
}

impl Planner<'_> {
    pub fn plan(&self, conditions: &[GenericCondition]) -> ReteResult<Plan> {
        let mut scope = Scope::default();
        let steps = self.plan_list(conditions, &mut scope, 0, "production")?;
        Ok(Plan { steps, bindings: scope.into_bindings() })
    }

    fn plan_list(
        &self,
        conditions: &[GenericCondition],
        scope: &mut Scope,
        level: usize,
        context: &str,
    ) -> ReteResult<Vec<Step>> {
        if conditions.is_empty() {
            return Err(ReteError::empty(context));
        }
        conditions
            .iter()
            .enumerate()
            .map(|(offset, condition)| self.plan_condition(condition, scope, level + offset))
            .collect()
    }

    fn plan_condition(
        &self,
        condition: &GenericCondition,
        scope: &mut Scope,
        level: usize,
    ) -> ReteResult<Step> {
        match condition {
            GenericCondition::Pattern(pattern) => self.plan_pattern(pattern, scope, level),
            GenericCondition::Negation(inner) => {
                let mut inner_scope = scope.clone();
                let inner = self.plan_list(inner, &mut inner_scope, level, "negation")?;
                Ok(Step::Negation { inner })
            }
            GenericCondition::Existence(inner) => {
                let mut inner_scope = scope.clone();
                let inner = self.plan_list(inner, &mut inner_scope, level, "existence")?;
                Ok(Step::Aggregate {
                    inner,
                    computation: Arc::new(Exists),
                    result_var: EXISTS_VAR.to_string(),
                    row: Vec::new(),
                    nonzero: true,
                })
            }
            GenericCondition::Aggregate { result_var, spec, conditions } => {
                let computation = self.resolve_aggregate(spec)?;
                let mut inner_scope = scope.clone();
                let inner = self.plan_list(conditions, &mut inner_scope, level, "aggregate")?;
                let row = computation
                    .variables()
                    .into_iter()
                    .map(|var| match inner_scope.get(&var) {
                        Some(binding) => Ok((var, binding)),
                        None => Err(ReteError::unbound(&var, format!("aggregate {spec}"))),
                    })
                    .collect::<ReteResult<Vec<_>>>()?;
                if scope.get(result_var).is_some() {
                    return Err(ReteError::InvalidCondition {
                        message: format!("aggregate result <{result_var}> is already bound"),
                    });
                }
                scope.bind(result_var, Binding::Field { level, field: FieldIndex::Id });
                Ok(Step::Aggregate {
                    inner,
                    computation,
                    result_var: result_var.clone(),
                    row,
                    nonzero: false,
                })
            }
        }
    }

    fn resolve_aggregate(&self, spec: &AggregateSpec) -> ReteResult<Arc<dyn AggregateComputation>> {
        match spec {
            AggregateSpec::Computation(computation) => Ok(computation.clone()),
            AggregateSpec::Named { name, argument } => self
                .aggregates
                .get(name)
                .cloned()
                .or_else(|| builtin(name, argument.as_deref()))
                .ok_or_else(|| ReteError::UnknownAggregate { name: spec.to_string() }),
        }
    }

    fn plan_pattern(&self, condition: &Condition, scope: &mut Scope, level: usize) -> ReteResult<Step> {
        let mut alpha = AlphaSpec::default();
        let mut tests = Vec::new();

        let fuzzy = condition
            .field(FieldIndex::Attribute)
            .as_const()
            .and_then(|attribute| self.fuzzy.get(attribute));
        for field in FieldIndex::ALL {
            let Some(value) = condition.field(field).as_const() else {
                continue;
            };
            match fuzzy {
                Some(variable) if field == FieldIndex::Value && variable.has_value(value) => {
                    let membership = FuzzyMembership::new(variable.clone(), value);
                    alpha.tests.push(TestKind::Custom(Arc::new(membership)));
                }
                _ => alpha.tests.push(TestKind::ConstEq { field, value: value.to_string() }),
            }
        }

        // Distinct variables with their first position
        let mut locals: Vec<(&str, FieldIndex)> = Vec::new();
        for field in FieldIndex::ALL {
            let Field::Var(name) = condition.field(field) else {
                continue;
            };
            match locals.iter().find(|(var, _)| *var == name.as_str()) {
                Some((_, first)) => {
                    alpha.tests.push(TestKind::IntraEq { first: *first, second: field })
                }
                None => locals.push((name.as_str(), field)),
            }
        }
        let local_field = |name: &str| -> Option<FieldIndex> {
            locals.iter().find(|(var, _)| *var == name).map(|(_, field)| *field)
        };

        let mut deferred: Vec<&ArithTest> = Vec::new();
        for test in &condition.intra_tests {
            let variables = test.variables();
            if !variables.is_empty() && variables.iter().all(|var| local_field(var).is_some()) {
                let field_test = FieldTest::new(test, local_field);
                alpha.tests.push(TestKind::Custom(Arc::new(field_test)));
            } else {
                deferred.push(test);
            }
        }
        for predicate in &condition.predicates {
            alpha.tests.push(TestKind::Custom(predicate.clone()));
        }

        for (name, field) in &locals {
            match scope.get(name) {
                Some(Binding::Field { level: earlier, field: other }) => {
                    tests.push(JoinTest::FieldEq { field: *field, level: earlier, other })
                }
                Some(Binding::Fact { level: earlier }) => {
                    tests.push(JoinTest::FactRef { field: *field, level: earlier })
                }
                None => {}
            }
        }

        for test in deferred.into_iter().chain(&condition.extra_tests) {
            let mut locations = Vec::new();
            for var in test.variables() {
                let binding = match local_field(&var) {
                    Some(field) => Binding::Field { level, field },
                    None => scope
                        .get(&var)
                        .ok_or_else(|| ReteError::unbound(&var, format!("test {test} of {condition}")))?,
                };
                locations.push((var, binding));
            }
            tests.push(JoinTest::Arith { test: test.clone(), locations });
        }

        for (name, field) in &locals {
            if scope.get(name).is_none() {
                scope.bind(name, Binding::Field { level, field: *field });
            }
        }
        if let Some(fact_var) = &condition.fact_var {
            if scope.get(fact_var).is_some() {
                return Err(ReteError::InvalidCondition {
                    message: format!("fact variable <{fact_var}> of {condition} is already bound"),
                });
            }
            scope.bind(fact_var, Binding::Fact { level });
        }

        Ok(Step::Pattern { alpha, tests })
    }
}

impl Network {
    /// Build the nodes for `plan` and terminate them in a production node
    pub(crate) fn build_production(
        &mut self,
        name: &str,
        plan: Plan,
        working_memory: &[FactId],
    ) -> ReteResult<NodeId> {
        let last = self.build_steps(&plan.steps, None, 0, working_memory)?;
        let id = self.next_node_id();
        self.betas.insert(
            id,
            BetaNode::Production(ProductionNode {
                id,
                name: name.to_string(),
                parent: last,
                items: Vec::new(),
                committed: Vec::new(),
                bindings: plan.bindings,
            }),
        );
        self.attach_child(last, id)?;
        debug!(production = %id, parent = %last, name, "Created production node");
        Ok(id)
    }

    /// Build a chain hanging off `anchor` and return its last emitter
    fn build_steps(
        &mut self,
        steps: &[Step],
        anchor: Option<NodeId>,
        level: usize,
        working_memory: &[FactId],
    ) -> ReteResult<NodeId> {
        let mut memory = anchor;
        let mut emitter: Option<NodeId> = None;
        for (offset, step) in steps.iter().enumerate() {
            if let Some(previous) = emitter {
                memory = Some(self.build_or_share_beta_memory(previous)?);
            }
            let level = level + offset;
            emitter = Some(match step {
                Step::Pattern { alpha, tests } => {
                    let alpha = self.build_or_share_alpha_memory(alpha, working_memory)?;
                    self.build_or_share_join(memory, alpha, tests.clone(), level)?
                }
                Step::Negation { inner } => self.build_negation(inner, memory, level, working_memory)?,
                Step::Aggregate { inner, computation, result_var, row, nonzero } => {
                    let tests = if *nonzero {
                        vec![JoinTest::Owner, JoinTest::NonZero]
                    } else {
                        vec![JoinTest::Owner]
                    };
                    let node = PendingAggregate {
                        computation: computation.clone(),
                        result_var: result_var.clone(),
                        row: row.clone(),
                        tests,
                    };
                    self.build_aggregate(inner, node, memory, level, working_memory)?
                }
            });
        }
        emitter.ok_or_else(|| ReteError::empty("condition chain"))
    }

    /// Inner chain, dummy join, NCC node and partner. Returns the NCC node.
    fn build_negation(
        &mut self,
        inner: &[Step],
        memory: Option<NodeId>,
        level: usize,
        working_memory: &[FactId],
    ) -> ReteResult<NodeId> {
        let inner_last = self.build_steps(inner, memory, level, working_memory)?;
        let dummy_join =
            self.create_join(JoinKind::Negation, memory, self.dummy_memory, Vec::new(), level)?;

        let ncc = self.next_node_id();
        let partner = self.next_node_id();
        self.betas.insert(
            ncc,
            BetaNode::Ncc(NccNode {
                id: ncc,
                parent: dummy_join,
                partner,
                items: Vec::new(),
                results: AHashMap::new(),
                children: Vec::new(),
            }),
        );
        self.betas.insert(
            partner,
            BetaNode::Partner(NccPartner {
                id: partner,
                parent: inner_last,
                ncc,
                levels: inner.len(),
                buffer: Vec::new(),
            }),
        );
        // Inner matches first, so new NCC tokens find their results waiting
        self.attach_child(inner_last, partner)?;
        self.attach_child(dummy_join, ncc)?;
        debug!(ncc_node = %ncc, ncc_partner = %partner, levels = inner.len(), "Created negation");
        Ok(ncc)
    }

    /// Gate join, inner chain and aggregate node. Returns the gate.
    fn build_aggregate(
        &mut self,
        inner: &[Step],
        node: PendingAggregate,
        memory: Option<NodeId>,
        level: usize,
        working_memory: &[FactId],
    ) -> ReteResult<NodeId> {
        let aggregate = self.next_node_id();
        let results = self.next_node_id();
        self.alpha_memories.insert(results, AlphaMemory::new(results, MemoryOwner::Aggregate(aggregate)));
        let gate = self.create_join(JoinKind::AggregateGate, memory, results, node.tests, level)?;

        let inner_last = self.build_steps(inner, memory, level, working_memory)?;
        self.betas.insert(
            aggregate,
            BetaNode::Aggregate(AggregateNode {
                id: aggregate,
                parent: inner_last,
                levels: inner.len(),
                computation: node.computation,
                result_var: node.result_var,
                row: node.row,
                memory: results,
                groups: AHashMap::new(),
            }),
        );
        self.attach_child(inner_last, aggregate)?;
        debug!(aggregate_node = %aggregate, gate = %gate, levels = inner.len(), "Created aggregate");
        Ok(gate)
    }

    /// Tear down a production and every node only it was using
    pub(crate) fn remove_production(&mut self, production: NodeId) -> ReteResult<()> {
        self.production(production)?;
        self.release_beta(production)
    }
}

/// Parameters of an aggregate node still to be built
struct PendingAggregate {
    computation: Arc<dyn AggregateComputation>,
    result_var: String,
    row: Vec<(String, Binding)>,
    tests: Vec<JoinTest>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_types::{ArithExpr, CompOp};

    fn planner_plan(conditions: &[GenericCondition]) -> ReteResult<Plan> {
        let fuzzy = AHashMap::new();
        let aggregates = AHashMap::new();
        Planner { fuzzy: &fuzzy, aggregates: &aggregates }.plan(conditions)
    }

    fn pattern(id: Field, attr: Field, value: Field) -> GenericCondition {
        Condition::new(id, attr, value).into()
    }

    #[test]
    fn test_plan_join_tests_and_bindings() {
        let conditions = vec![
            pattern(Field::var("x"), Field::constant("on"), Field::var("y")),
            pattern(Field::var("y"), Field::constant("left-of"), Field::var("z")),
        ];
        let plan = planner_plan(&conditions).unwrap();
        assert_eq!(plan.steps.len(), 2);
        let Step::Pattern { tests, .. } = &plan.steps[1] else {
            panic!("expected a pattern step");
        };
        assert_eq!(
            tests,
            &vec![JoinTest::FieldEq { field: FieldIndex::Id, level: 0, other: FieldIndex::Value }]
        );
        let names: Vec<&str> = plan.bindings.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_repeated_variable_is_an_alpha_test() {
        let plan =
            planner_plan(&[pattern(Field::var("x"), Field::constant("on"), Field::var("x"))]).unwrap();
        let Step::Pattern { alpha, tests } = &plan.steps[0] else {
            panic!("expected a pattern step");
        };
        assert!(tests.is_empty());
        assert!(matches!(
            alpha.tests[1],
            TestKind::IntraEq { first: FieldIndex::Id, second: FieldIndex::Value }
        ));
    }

    #[test]
    fn test_local_arith_goes_to_alpha_network() {
        let local = ArithTest::new(ArithExpr::var("y"), CompOp::Gt, ArithExpr::Number(2.0));
        let condition =
            Condition::new(Field::var("x"), Field::constant("size"), Field::var("y")).with_intra_test(local);
        let plan = planner_plan(&[condition.into()]).unwrap();
        let Step::Pattern { alpha, tests } = &plan.steps[0] else {
            panic!("expected a pattern step");
        };
        assert!(tests.is_empty());
        assert!(matches!(alpha.tests.last(), Some(TestKind::Custom(_))));
    }

    #[test]
    fn test_unbound_variable_is_rejected() {
        let extra = ArithTest::new(ArithExpr::var("w"), CompOp::Lt, ArithExpr::var("y"));
        let condition =
            Condition::new(Field::var("x"), Field::constant("size"), Field::var("y")).with_extra_test(extra);
        let err = planner_plan(&[condition.into()]).unwrap_err();
        assert!(matches!(err, ReteError::UnboundVariable { ref variable, .. } if variable == "w"));
    }

    #[test]
    fn test_empty_and_unknown_aggregate_are_rejected() {
        assert!(matches!(planner_plan(&[]), Err(ReteError::EmptyConditions { .. })));
        assert!(matches!(
            planner_plan(&[GenericCondition::Negation(Vec::new())]),
            Err(ReteError::EmptyConditions { .. })
        ));

        let inner = vec![pattern(Field::var("y"), Field::constant("color"), Field::var("c"))];
        let unknown = GenericCondition::aggregate("m", AggregateSpec::named("#MEDIAN"), inner);
        assert!(matches!(planner_plan(&[unknown]), Err(ReteError::UnknownAggregate { .. })));
    }

    #[test]
    fn test_aggregate_binds_result_at_its_level() {
        let inner = vec![pattern(Field::var("y"), Field::constant("color"), Field::var("c"))];
        let conditions = vec![
            pattern(Field::var("x"), Field::constant("on"), Field::var("y")),
            GenericCondition::aggregate("cnt", AggregateSpec::named("#COUNT"), inner),
        ];
        let plan = planner_plan(&conditions).unwrap();
        let cnt = plan.bindings.iter().find(|(n, _)| n == "cnt").map(|(_, b)| *b);
        assert_eq!(cnt, Some(Binding::Field { level: 1, field: FieldIndex::Id }));
        assert!(plan.bindings.iter().all(|(n, _)| n != "c"), "inner variables stay inner");
    }
}
