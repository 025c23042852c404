// engine.rs — ArgumentEngine: derive and verify a kernel invocation's arguments
//
// Built once per operator from its declared providers, stencils and tiling
// descriptors; `handle` is then called once per invocation with whatever
// values the caller supplied.
//
// Preconditions: provider names are unique.
// Postconditions: `handle` returns every kernel argument, in declaration
//                 order, fully resolved and verified; or an error and nothing.
// Failure modes: see `ArgError`.
// Side effects: debug/trace logging only. The engine is never mutated by
//               `handle`, so one engine may serve concurrent calls.

use indexmap::IndexMap;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};

use crate::build::build_graph;
use crate::diag::ArgError;
use crate::param::{ParameterGraph, Target};
use crate::provider::{end_name, size_name, Provider};
use crate::resolve::{derive_values, runtime_dim_extent, KnownValues, Reducer};
use crate::stencil::{retrieve_offsets, Stencil};
use crate::tiling::TilingArgument;
use crate::value::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Combines several candidate sizes of one dimension.
    #[serde(default)]
    pub reducer: Reducer,
}

/// Resolved arguments of one kernel call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub arguments: IndexMap<String, Value>,
    /// Caller's autotune request, cleared if any tile size is fixed.
    pub autotune: bool,
    /// Concrete size of every tiling argument, by block dimension name.
    pub tile_sizes: IndexMap<String, i64>,
}

impl Invocation {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }
}

#[derive(Debug, Clone)]
pub struct ArgumentEngine {
    graph: ParameterGraph,
    /// Halo offset per dimension end argument.
    offsets: IndexMap<String, i64>,
    options: EngineOptions,
}

impl ArgumentEngine {
    pub fn new(
        stencils: &[Stencil],
        parameters: Vec<Provider>,
        tiling: Vec<TilingArgument>,
    ) -> Self {
        Self::with_options(stencils, parameters, tiling, EngineOptions::default())
    }

    pub fn with_options(
        stencils: &[Stencil],
        parameters: Vec<Provider>,
        tiling: Vec<TilingArgument>,
        options: EngineOptions,
    ) -> Self {
        let graph = build_graph(parameters, tiling);
        let offsets: IndexMap<String, i64> = retrieve_offsets(stencils)
            .into_iter()
            .map(|(dim, offset)| (end_name(&dim), offset))
            .collect();
        debug!(
            "argument engine: {} arguments, {} dimensions, {} halo offsets",
            graph.arguments.len(),
            graph.dims.len(),
            offsets.len()
        );
        Self {
            graph,
            offsets,
            options,
        }
    }

    pub fn graph(&self) -> &ParameterGraph {
        &self.graph
    }

    pub fn offsets(&self) -> &IndexMap<String, i64> {
        &self.offsets
    }

    /// Names of the kernel arguments, in the order `handle` returns them.
    pub fn argument_names(&self) -> impl Iterator<Item = &str> {
        self.graph.argument_names()
    }

    /// Derive every argument value from the caller's partial input.
    pub fn handle(
        &self,
        values: IndexMap<String, Value>,
        autotune: bool,
    ) -> Result<Invocation, ArgError> {
        let values = self.offset_adjust(values)?;
        let mut values = self.extract_children_of_composites(values)?;
        let supplied: Vec<String> = values.keys().cloned().collect();

        let known = derive_values(&self.graph, &self.options.reducer, &mut values)?;
        let (tile_sizes, tunable) = self.tiling_arguments(&known, &supplied)?;

        let mut arguments = IndexMap::with_capacity(self.graph.arguments.len());
        for &id in &self.graph.arguments {
            let name = &self.graph.node(id).name;
            let value = known.get(id).ok_or_else(|| ArgError::MissingValue {
                name: name.clone(),
            })?;
            arguments.insert(name.clone(), value.clone());
        }
        self.verify(&arguments)?;

        Ok(Invocation {
            arguments,
            autotune: autotune && tunable,
            tile_sizes,
        })
    }

    /// Add the halo offset to each supplied dimension end.
    fn offset_adjust(
        &self,
        mut values: IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>, ArgError> {
        for (name, value) in values.iter_mut() {
            let Some(offset) = self.offsets.get(name) else {
                continue;
            };
            let end = value.as_int().ok_or_else(|| ArgError::TypeMismatch {
                name: name.clone(),
                expected: "an integer end value",
                found: value.kind_name(),
            })?;
            let adjusted = end.checked_add(*offset).ok_or_else(|| ArgError::OutOfRange {
                name: name.clone(),
                value: end,
                offset: *offset,
            })?;
            trace!("halo offset: {} = {} + {}", name, end, offset);
            *value = Value::Int(adjusted);
        }
        Ok(values)
    }

    /// Replace each composite value by its array, and bind its child values
    /// to the declared children's names.
    fn extract_children_of_composites(
        &self,
        values: IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>, ArgError> {
        let mut children = IndexMap::new();
        let mut flat = IndexMap::with_capacity(values.len());
        for (name, value) in values {
            let composite = match value {
                Value::Composite(c) => c,
                other => {
                    flat.insert(name, other);
                    continue;
                }
            };
            let provider = self
                .graph
                .find_provider(&name)
                .map(|id| self.graph.provider(id))
                .ok_or_else(|| ArgError::UnknownParameter { name: name.clone() })?;
            let function = provider
                .as_function()
                .filter(|f| f.is_composite())
                .ok_or_else(|| ArgError::NotComposite { name: name.clone() })?;
            for (child, child_value) in function.children.iter().zip(composite.children) {
                trace!("composite {}: child {} = {}", name, child, child_value);
                children.insert(child.clone(), child_value);
            }
            flat.insert(name, Value::Array(composite.array));
        }
        flat.extend(children);
        Ok(flat)
    }

    /// Concrete tile sizes, and whether every one is autotunable. A tiling
    /// argument whose block size the caller supplied is reported as passed
    /// and cannot be tuned.
    fn tiling_arguments(
        &self,
        known: &KnownValues,
        supplied: &[String],
    ) -> Result<(IndexMap<String, i64>, bool), ArgError> {
        let mut sizes = IndexMap::new();
        let mut tunable = true;
        for tiling in &self.graph.tiling {
            let Some(extent) = runtime_dim_extent(&self.graph, known, &tiling.original_dim) else {
                error!(
                    "unable to derive size of dimension {} from defaults, please provide an explicit value",
                    tiling.original_dim
                );
                return Err(ArgError::UnresolvableDimension {
                    dim: tiling.original_dim.clone(),
                });
            };
            let size_arg = size_name(&tiling.argument);
            let overridden = supplied
                .iter()
                .any(|s| *s == tiling.argument || *s == size_arg);
            let passed = self
                .graph
                .find_argument(&size_arg)
                .and_then(|id| known.get(id))
                .and_then(Value::as_int);
            let (size, fits) = match passed {
                Some(size) if overridden => (size, false),
                _ => tiling.value.apply(extent),
            };
            trace!(
                "tiling {}: extent {} -> size {} (autotunable: {})",
                tiling.argument,
                extent,
                size,
                fits
            );
            tunable &= fits;
            sizes.insert(tiling.argument.clone(), size);
        }
        Ok((sizes, tunable))
    }

    fn verify(&self, arguments: &IndexMap<String, Value>) -> Result<(), ArgError> {
        for &id in &self.graph.arguments {
            let node = self.graph.node(id);
            let Some(value) = arguments.get(&node.name) else {
                continue;
            };
            for dep in node.verified_by() {
                let Target::Check(check) = &dep.target else {
                    return Err(ArgError::internal(format!(
                        "verification edge of '{}' does not point at a check",
                        node.name
                    )));
                };
                if !check.holds(value) {
                    return Err(ArgError::VerificationFailed {
                        name: node.name.clone(),
                        check: check.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Debug-log every argument about to be passed to the kernel.
pub fn log_arguments(invocation: &Invocation) {
    for (name, value) in &invocation.arguments {
        match value.as_array() {
            Some(array) => debug!(
                "passing argument {} using shape {:?} and dtype {}",
                name, array.shape, array.dtype
            ),
            None => debug!("passing argument {} = {}", name, value),
        }
    }
}
