// resolve.rs — Value derivation over the parameter graph
//
// Three passes over the kernel-visible arguments:
//   1. seed: user-supplied values for arguments and dimensions;
//   2. propagate: evaluate each unset argument's `GetsValueFrom` edges,
//      falling back to its `Default` edge; several candidates are reduced
//      (maximum by default), or deferred as `Pending` while any is unknown;
//   3. settle: retry pending and unset arguments until a full round makes no
//      progress, then reduce whatever candidates each pending entry holds.
//
// Preconditions: `graph` was produced by `build::build_graph`.
// Postconditions: no argument slot is `Pending` after `derive_values`.
// Failure modes: unconsumed input keys, non-integer dimension candidates,
//                mismatched array ranks → user `ArgError`; structural defects
//                (consumer/target kind mismatch) → `ArgError::Internal`.
// Side effects: none; every call allocates its own `KnownValues`.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::diag::ArgError;
use crate::id::{NodeId, ProviderId};
use crate::param::{DimRole, Dependency, Evaluator, NodeKind, ParameterGraph, Payload, Target};
use crate::provider::{end_name, start_name, Provider};
use crate::value::{ArrayValue, Value};

/// Recursion guard for dimension → dimension chains.
const MAX_RESOLVE_DEPTH: usize = 64;

// ── Reducer ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ReduceFn {
    pub label: String,
    pub func: Arc<dyn Fn(&[i64]) -> i64 + Send + Sync>,
}

impl ReduceFn {
    pub fn new(label: impl Into<String>, func: impl Fn(&[i64]) -> i64 + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for ReduceFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReduceFn({})", self.label)
    }
}

/// Policy combining several candidate values for one dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Large enough for every participating array.
    #[default]
    Max,
    Min,
    #[serde(skip)]
    Custom(ReduceFn),
}

impl Reducer {
    /// `None` only for an empty candidate list.
    pub fn reduce(&self, values: &[i64]) -> Option<i64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Reducer::Max => values.iter().copied().max(),
            Reducer::Min => values.iter().copied().min(),
            Reducer::Custom(f) => Some((f.func)(values)),
        }
    }
}

// ── Known values ────────────────────────────────────────────────────────────

/// Candidates of a deferred value: those already resolved, and the edges
/// (with their consuming node) still waiting on unknown information.
#[derive(Debug, Clone, Default)]
pub struct Pending {
    pub partial: Vec<Value>,
    pub waiting: Vec<(NodeId, Dependency)>,
}

#[derive(Debug, Clone, Default)]
pub enum Slot {
    #[default]
    Unset,
    Known(Value),
    Pending(Pending),
}

/// Per-call value map, indexed by node.
#[derive(Debug, Clone)]
pub struct KnownValues {
    slots: Vec<Slot>,
}

impl KnownValues {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![Slot::Unset; len],
        }
    }

    pub fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[id.index()]
    }

    pub fn set(&mut self, id: NodeId, slot: Slot) {
        self.slots[id.index()] = slot;
    }

    /// Resolved value, ignoring unset and pending slots.
    pub fn get(&self, id: NodeId) -> Option<&Value> {
        match self.slot(id) {
            Slot::Known(v) => Some(v),
            _ => None,
        }
    }

    fn outcome(&self, id: NodeId) -> Outcome {
        match self.get(id) {
            Some(v) => Outcome::Known(v.clone()),
            None => Outcome::Unknown,
        }
    }
}

/// Result of evaluating one edge.
#[derive(Debug, Clone)]
enum Outcome {
    Known(Value),
    Unknown,
    Pending(Pending),
}

impl Outcome {
    fn into_slot(self) -> Slot {
        match self {
            Outcome::Known(v) => Slot::Known(v),
            Outcome::Unknown => Slot::Unset,
            Outcome::Pending(p) => Slot::Pending(p),
        }
    }
}

// ── Lookup helpers ──────────────────────────────────────────────────────────

/// Resolved value of the argument called `name`.
pub fn find_argument_by_name<'k>(
    graph: &ParameterGraph,
    known: &'k KnownValues,
    name: &str,
) -> Option<&'k Value> {
    graph.find_argument(name).and_then(|id| known.get(id))
}

/// Runtime extent (`end - start`) of a dimension, once both are known. An
/// extent that does not fit in an `i64` is treated as unknown.
pub fn runtime_dim_extent(graph: &ParameterGraph, known: &KnownValues, dim: &str) -> Option<i64> {
    let end = find_argument_by_name(graph, known, &end_name(dim))?.as_int()?;
    let start = find_argument_by_name(graph, known, &start_name(dim))?.as_int()?;
    end.checked_sub(start)
}

// ── Derivation ──────────────────────────────────────────────────────────────

/// Seed, propagate and settle all argument values. Consumes matched keys
/// from `input`; any key left over is an error.
pub fn derive_values(
    graph: &ParameterGraph,
    reducer: &Reducer,
    input: &mut IndexMap<String, Value>,
) -> Result<KnownValues, ArgError> {
    let resolver = Resolver { graph, reducer };
    let mut known = KnownValues::new(graph.nodes.len());

    // Pass 1: seed.
    for &id in graph.arguments.iter().chain(graph.dims.iter()) {
        if let Some(value) = input.shift_remove(&graph.node(id).name) {
            known.set(id, Slot::Known(value));
        }
    }
    if !input.is_empty() {
        return Err(ArgError::UnknownArguments {
            names: input.keys().cloned().collect(),
        });
    }

    // Pass 2: propagate.
    for &id in &graph.arguments {
        if matches!(known.slot(id), Slot::Unset) {
            let outcome = resolver.resolve_argument(id, &known)?;
            trace!("pass 2: '{}' -> {:?}", graph.node(id).name, outcome);
            known.set(id, outcome.into_slot());
        }
    }

    // Pass 3: settle.
    resolver.settle(&mut known)?;
    Ok(known)
}

struct Resolver<'g> {
    graph: &'g ParameterGraph,
    reducer: &'g Reducer,
}

impl<'g> Resolver<'g> {
    fn name(&self, id: NodeId) -> &'g str {
        &self.graph.node(id).name
    }

    fn resolve_argument(&self, id: NodeId, known: &KnownValues) -> Result<Outcome, ArgError> {
        let node = self.graph.node(id);
        let sources: Vec<&Dependency> = node.gets_value_from().collect();
        if sources.is_empty() && node.defaults().next().is_none() {
            return Err(ArgError::internal(format!(
                "argument '{}' has no value source",
                node.name
            )));
        }

        let outcome = if sources.is_empty() {
            Outcome::Unknown
        } else {
            let outcomes = sources
                .iter()
                .map(|dep| self.eval_dependency(id, dep, known, 0))
                .collect::<Result<Vec<_>, _>>()?;
            self.combine(id, &sources, outcomes)?
        };

        if !matches!(outcome, Outcome::Unknown) {
            return Ok(outcome);
        }
        for dep in node.defaults() {
            if let Outcome::Known(v) = self.eval_dependency(id, dep, known, 0)? {
                return Ok(Outcome::Known(v));
            }
        }
        Ok(Outcome::Unknown)
    }

    /// Merge the outcomes of `consumer`'s candidate edges.
    fn combine(
        &self,
        consumer: NodeId,
        sources: &[&Dependency],
        mut outcomes: Vec<Outcome>,
    ) -> Result<Outcome, ArgError> {
        if outcomes.len() == 1 {
            return Ok(outcomes.remove(0));
        }
        let mut pending = Pending::default();
        for (dep, outcome) in sources.iter().zip(outcomes) {
            match outcome {
                Outcome::Known(v) => pending.partial.push(v),
                Outcome::Unknown => pending.waiting.push((consumer, (*dep).clone())),
                Outcome::Pending(inner) => {
                    pending.partial.extend(inner.partial);
                    pending.waiting.extend(inner.waiting);
                }
            }
        }
        if pending.waiting.is_empty() {
            return self.finish(consumer, pending.partial);
        }
        Ok(Outcome::Pending(pending))
    }

    fn finish(&self, consumer: NodeId, mut partial: Vec<Value>) -> Result<Outcome, ArgError> {
        match partial.len() {
            0 => Ok(Outcome::Unknown),
            1 => Ok(Outcome::Known(partial.remove(0))),
            _ => Ok(Outcome::Known(self.reduce(consumer, &partial)?)),
        }
    }

    fn reduce(&self, consumer: NodeId, candidates: &[Value]) -> Result<Value, ArgError> {
        let ints = candidates
            .iter()
            .map(|v| {
                v.as_int().ok_or_else(|| ArgError::TypeMismatch {
                    name: self.name(consumer).to_string(),
                    expected: "integer candidates",
                    found: v.kind_name(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.reducer
            .reduce(&ints)
            .map(Value::Int)
            .ok_or_else(|| ArgError::internal("reduce over no candidates"))
    }

    fn eval_dependency(
        &self,
        consumer: NodeId,
        dep: &Dependency,
        known: &KnownValues,
        depth: usize,
    ) -> Result<Outcome, ArgError> {
        match &dep.target {
            Target::Literal(v) => Ok(Outcome::Known(v.clone())),
            Target::Provider(id) => self.provider_value(consumer, *id),
            Target::Evaluator(Evaluator::TileSize) => match dep.param {
                Payload::Tiling(index) => self.tile_size(consumer, dep, index, known),
                other => Err(ArgError::internal(format!(
                    "tile-size edge of '{}' carries {:?}",
                    self.name(consumer),
                    other
                ))),
            },
            Target::Node(id) => match (&self.graph.node(*id).kind, dep.param) {
                (NodeKind::Dimension(_), _) => self.dimension_value(consumer, *id, known, depth),
                (NodeKind::Tensor { .. }, Payload::Axis(axis)) => {
                    self.shape_at(consumer, *id, axis, known)
                }
                _ => Ok(known.outcome(*id)),
            },
            Target::Check(_) => Err(ArgError::internal(format!(
                "check used as a value source for '{}'",
                self.name(consumer)
            ))),
        }
    }

    fn provider_value(&self, consumer: NodeId, id: ProviderId) -> Result<Outcome, ArgError> {
        let outcome = match self.graph.provider(id) {
            Provider::Function(f) => {
                if !matches!(self.graph.node(consumer).kind, NodeKind::Tensor { .. }) {
                    return Err(ArgError::internal(format!(
                        "data of function '{}' requested by non-tensor '{}'",
                        f.name,
                        self.name(consumer)
                    )));
                }
                f.data
                    .clone()
                    .map_or(Outcome::Unknown, |a| Outcome::Known(Value::Array(a)))
            }
            Provider::Array(a) => {
                Outcome::Known(Value::Array(ArrayValue::new(a.dtype, a.shape.clone())))
            }
            Provider::Constant(c) => Outcome::Known(c.value.clone()),
            Provider::Scalar(s) => s.default.clone().map_or(Outcome::Unknown, Outcome::Known),
            Provider::Object(o) => Outcome::Known(Value::Handle(o.value)),
            Provider::Dimension(d) => {
                return Err(ArgError::internal(format!(
                    "dimension '{}' used as a provider target",
                    d.name
                )))
            }
        };
        Ok(outcome)
    }

    fn shape_at(
        &self,
        consumer: NodeId,
        tensor: NodeId,
        axis: usize,
        known: &KnownValues,
    ) -> Result<Outcome, ArgError> {
        if self.graph.node(consumer).as_dimension().is_none() {
            return Err(ArgError::internal(format!(
                "shape of '{}' requested by non-dimension '{}'",
                self.name(tensor),
                self.name(consumer)
            )));
        }
        let Some(value) = known.get(tensor) else {
            return Ok(Outcome::Unknown);
        };
        let array = value.as_array().ok_or_else(|| ArgError::TypeMismatch {
            name: self.name(tensor).to_string(),
            expected: "an array",
            found: value.kind_name(),
        })?;
        match array.dim(axis) {
            Some(n) => Ok(Outcome::Known(Value::Int(n as i64))),
            None => Err(ArgError::TypeMismatch {
                name: self.name(tensor).to_string(),
                expected: "an array with one axis per indexing dimension",
                found: "an array of lower rank",
            }),
        }
    }

    fn dimension_value(
        &self,
        consumer: NodeId,
        dim: NodeId,
        known: &KnownValues,
        depth: usize,
    ) -> Result<Outcome, ArgError> {
        if self.graph.node(consumer).dim_role(dim) == Some(DimRole::Start) {
            return Ok(Outcome::Known(Value::Int(0)));
        }
        if let Some(v) = known.get(dim) {
            return Ok(Outcome::Known(v.clone()));
        }
        if depth >= MAX_RESOLVE_DEPTH {
            return Err(ArgError::internal(format!(
                "dependency chain through dimension '{}' exceeds {} levels",
                self.name(dim),
                MAX_RESOLVE_DEPTH
            )));
        }
        let sources: Vec<&Dependency> = self.graph.node(dim).gets_value_from().collect();
        if sources.is_empty() {
            return Ok(Outcome::Unknown);
        }
        let outcomes = sources
            .iter()
            .map(|dep| self.eval_dependency(dim, dep, known, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;
        self.combine(dim, &sources, outcomes)
    }

    fn tile_size(
        &self,
        consumer: NodeId,
        dep: &Dependency,
        index: usize,
        known: &KnownValues,
    ) -> Result<Outcome, ArgError> {
        let tiling = self.graph.tiling.get(index).ok_or_else(|| {
            ArgError::internal(format!("tiling descriptor {} does not exist", index))
        })?;
        match runtime_dim_extent(self.graph, known, &tiling.original_dim) {
            Some(extent) => Ok(Outcome::Known(Value::Int(tiling.value.apply(extent).0))),
            None => Ok(Outcome::Pending(Pending {
                partial: Vec::new(),
                waiting: vec![(consumer, dep.clone())],
            })),
        }
    }

    /// Re-evaluate the waiting edges of a pending entry.
    fn retry(
        &self,
        id: NodeId,
        pending: Pending,
        known: &KnownValues,
    ) -> Result<Outcome, ArgError> {
        let mut next = Pending {
            partial: pending.partial,
            waiting: Vec::new(),
        };
        for (consumer, dep) in pending.waiting {
            match self.eval_dependency(consumer, &dep, known, 0)? {
                Outcome::Known(v) => next.partial.push(v),
                Outcome::Unknown => next.waiting.push((consumer, dep)),
                Outcome::Pending(inner) => {
                    next.partial.extend(inner.partial);
                    next.waiting.extend(inner.waiting);
                }
            }
        }
        if next.waiting.is_empty() {
            return self.finish(id, next.partial);
        }
        Ok(Outcome::Pending(next))
    }

    fn settle(&self, known: &mut KnownValues) -> Result<(), ArgError> {
        for round in 0..=self.graph.nodes.len() {
            let mut progress = false;
            for &id in &self.graph.arguments {
                let (next, before) = match known.slot(id) {
                    Slot::Known(_) => continue,
                    Slot::Unset => (self.resolve_argument(id, known)?, None),
                    Slot::Pending(p) => {
                        let before = (p.partial.len(), p.waiting.len());
                        (self.retry(id, p.clone(), known)?, Some(before))
                    }
                };
                let advanced = match (&next, before) {
                    (Outcome::Known(_), _) => true,
                    (Outcome::Unknown, _) => false,
                    (Outcome::Pending(_), None) => true,
                    (Outcome::Pending(p), Some((partial, waiting))) => {
                        p.partial.len() > partial || p.waiting.len() < waiting
                    }
                };
                if advanced {
                    trace!("pass 3 round {}: '{}' -> {:?}", round, self.name(id), next);
                    known.set(id, next.into_slot());
                    progress = true;
                }
            }
            if !progress {
                break;
            }
        }

        // No further progress possible: reduce the candidates at hand.
        for &id in &self.graph.arguments {
            if let Slot::Pending(p) = known.slot(id) {
                let partial = p.partial.clone();
                let slot = self.finish(id, partial)?.into_slot();
                known.set(id, slot);
            }
        }
        Ok(())
    }
}
