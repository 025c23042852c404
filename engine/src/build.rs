// build.rs — Parameter graph construction
//
// Maps declared providers onto graph nodes:
//   1. each function becomes a tensor argument; every indexing dimension
//      gets a `GetsValueFrom` edge to the tensor, carrying the axis;
//   2. each tiling descriptor gives its block dimension an edge to the
//      tile-size evaluator;
//   3. every dimension seen (or declared) becomes one dimension node;
//   4. a stepping dimension's parent may take its value from the stepping
//      dimension;
//   5. each dimension yields size/start/end scalar arguments;
//   6. remaining providers (scalars, constants, objects, temporary arrays)
//      become their matching argument kind.
//
// Preconditions: provider names are unique.
// Postconditions: node order = tensors, dimensions, dimension scalars, others;
//                 `arguments` is unique by name (first declaration wins).
// Failure modes: none; construction is total.
// Side effects: none.

use indexmap::IndexMap;
use log::{debug, trace};

use crate::check::Check;
use crate::id::{IdAllocator, NodeId, ProviderId};
use crate::param::{
    DimRole, Dependency, Evaluator, NodeKind, Parameter, ParameterGraph, Payload, Target,
};
use crate::provider::{end_name, size_name, start_name, Dimension, Provider};
use crate::tiling::TilingArgument;
use crate::value::DType;

/// Build the parameter graph for a set of declared providers.
pub fn build_graph(providers: Vec<Provider>, tiling: Vec<TilingArgument>) -> ParameterGraph {
    let mut builder = GraphBuilder::new(providers, tiling);
    builder.visit_functions();
    builder.visit_tiling();
    builder.visit_dimensions();
    builder.link_stepping();
    builder.visit_dimension_arguments();
    builder.visit_remaining();
    builder.finish()
}

/// Names of the runtime arguments `providers` produce, in order.
pub fn runtime_arguments(providers: &[Provider]) -> Vec<String> {
    let graph = build_graph(providers.to_vec(), Vec::new());
    graph.argument_names().map(str::to_string).collect()
}

// ── Internal builder ────────────────────────────────────────────────────────

struct GraphBuilder {
    providers: Vec<Provider>,
    tiling: Vec<TilingArgument>,
    ids: IdAllocator,
    nodes: Vec<Parameter>,
    /// Edges accumulated per dimension name before dimension nodes exist.
    dim_edges: IndexMap<String, Vec<Dependency>>,
    dim_nodes: IndexMap<String, NodeId>,
    arguments: Vec<NodeId>,
}

impl GraphBuilder {
    fn new(providers: Vec<Provider>, tiling: Vec<TilingArgument>) -> Self {
        Self {
            providers,
            tiling,
            ids: IdAllocator::new(),
            nodes: Vec::new(),
            dim_edges: IndexMap::new(),
            dim_nodes: IndexMap::new(),
            arguments: Vec::new(),
        }
    }

    fn push(&mut self, name: String, kind: NodeKind, dependencies: Vec<Dependency>) -> NodeId {
        let id = self.ids.alloc_node();
        trace!("node {} '{}' with {} dependencies", id, name, dependencies.len());
        self.nodes.push(Parameter {
            id,
            name,
            kind,
            dependencies,
        });
        id
    }

    /// Add a kernel-visible argument unless one of the same name exists.
    fn push_argument(
        &mut self,
        name: String,
        kind: NodeKind,
        dependencies: Vec<Dependency>,
    ) -> Option<NodeId> {
        if self
            .arguments
            .iter()
            .any(|id| self.nodes[id.index()].name == name)
        {
            debug!("argument '{}' already provided, skipping duplicate", name);
            return None;
        }
        let id = self.push(name, kind, dependencies);
        self.arguments.push(id);
        Some(id)
    }

    fn checks_of(provider: &Provider) -> Vec<Dependency> {
        provider
            .checks()
            .iter()
            .cloned()
            .map(Dependency::verified_by)
            .collect()
    }

    fn visit_functions(&mut self) {
        for index in 0..self.providers.len() {
            let Provider::Function(function) = &self.providers[index] else {
                continue;
            };
            let provider_id = ProviderId(index as u32);
            let name = function.name.clone();
            let dtype = function.dtype;
            let indices = function.indices.clone();
            let mut deps = vec![Dependency::gets_value_from(Target::Provider(provider_id))];
            deps.extend(Self::checks_of(&self.providers[index]));

            let Some(tensor) = self.push_argument(
                name,
                NodeKind::Tensor {
                    dtype,
                    provider: provider_id,
                },
                deps,
            ) else {
                continue;
            };
            for (axis, dim) in indices.into_iter().enumerate() {
                self.dim_edges.entry(dim).or_default().push(
                    Dependency::gets_value_from(Target::Node(tensor))
                        .with_param(Payload::Axis(axis)),
                );
            }
        }
    }

    fn visit_tiling(&mut self) {
        for (index, tiling) in self.tiling.iter().enumerate() {
            self.dim_edges.entry(tiling.argument.clone()).or_default().push(
                Dependency::gets_value_from(Target::Evaluator(Evaluator::TileSize))
                    .with_param(Payload::Tiling(index)),
            );
        }
    }

    fn declared_dimension(&self, name: &str) -> Dimension {
        self.providers
            .iter()
            .filter_map(Provider::as_dimension)
            .find(|d| d.name == name)
            .cloned()
            .unwrap_or_else(|| Dimension::new(name))
    }

    fn visit_dimensions(&mut self) {
        let edges = std::mem::take(&mut self.dim_edges);
        for (name, deps) in edges {
            let dim = self.declared_dimension(&name);
            let id = self.push(name.clone(), NodeKind::Dimension(dim), deps);
            self.dim_nodes.insert(name, id);
        }

        // Declared but never indexed or blocked: value must come from input.
        let unreferenced: Vec<Dimension> = self
            .providers
            .iter()
            .filter_map(Provider::as_dimension)
            .filter(|d| !self.dim_nodes.contains_key(&d.name))
            .cloned()
            .collect();
        for dim in unreferenced {
            let name = dim.name.clone();
            let id = self.push(name.clone(), NodeKind::Dimension(dim), Vec::new());
            self.dim_nodes.insert(name, id);
        }
    }

    fn dimension_node(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.dim_nodes.get(name) {
            return *id;
        }
        let dim = Dimension::new(name);
        let id = self.push(name.to_string(), NodeKind::Dimension(dim), Vec::new());
        self.dim_nodes.insert(name.to_string(), id);
        id
    }

    fn link_stepping(&mut self) {
        let stepping: Vec<(NodeId, String)> = self
            .dim_nodes
            .values()
            .filter_map(|id| {
                let dim = self.nodes[id.index()].as_dimension()?;
                if !dim.is_stepping() {
                    return None;
                }
                dim.parent().map(|parent| (*id, parent.to_string()))
            })
            .collect();
        for (child, parent) in stepping {
            let parent_id = self.dimension_node(&parent);
            self.nodes[parent_id.index()]
                .dependencies
                .push(Dependency::gets_value_from(Target::Node(child)));
        }
    }

    fn visit_dimension_arguments(&mut self) {
        let dims: Vec<NodeId> = self.dim_nodes.values().copied().collect();
        for dim_id in dims {
            let dim_name = self.nodes[dim_id.index()].name.clone();
            let names = [
                (size_name(&dim_name), DimRole::Size),
                (start_name(&dim_name), DimRole::Start),
                (end_name(&dim_name), DimRole::End),
            ];
            for (name, role) in names {
                self.push_argument(
                    name,
                    NodeKind::Scalar {
                        dtype: DType::Int32,
                        dim: Some((dim_id, role)),
                    },
                    vec![
                        Dependency::gets_value_from(Target::Node(dim_id)),
                        Dependency::verified_by(Check::NonNegative),
                    ],
                );
            }
        }
    }

    fn visit_remaining(&mut self) {
        for index in 0..self.providers.len() {
            let provider_id = ProviderId(index as u32);
            let provider = &self.providers[index];
            let name = provider.name().to_string();
            let checks = Self::checks_of(provider);
            let (kind, mut deps) = match provider {
                Provider::Function(_) | Provider::Dimension(_) => continue,
                Provider::Array(a) => (
                    NodeKind::Tensor {
                        dtype: a.dtype,
                        provider: provider_id,
                    },
                    vec![Dependency::gets_value_from(Target::Provider(provider_id))],
                ),
                Provider::Scalar(s) => (
                    NodeKind::Scalar {
                        dtype: s.dtype,
                        dim: None,
                    },
                    vec![Dependency::default_from(provider_id)],
                ),
                Provider::Constant(c) => (
                    NodeKind::Scalar {
                        dtype: c.dtype,
                        dim: None,
                    },
                    vec![Dependency::default_from(provider_id)],
                ),
                Provider::Object(_) => (
                    NodeKind::Ptr {
                        dtype: DType::Ptr,
                        provider: provider_id,
                    },
                    vec![Dependency::gets_value_from(Target::Provider(provider_id))],
                ),
            };
            deps.extend(checks);
            self.push_argument(name, kind, deps);
        }
    }

    fn finish(self) -> ParameterGraph {
        let dims: Vec<NodeId> = self.dim_nodes.values().copied().collect();
        debug!(
            "built parameter graph: {} nodes, {} arguments, {} dimensions",
            self.nodes.len(),
            self.arguments.len(),
            dims.len()
        );
        ParameterGraph {
            nodes: self.nodes,
            providers: self.providers,
            tiling: self.tiling,
            arguments: self.arguments,
            dims,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::DependencyKind;
    use crate::provider::{Constant, Function, Object, Scalar, TempArray};
    use crate::tiling::TileSize;
    use crate::value::Handle;

    fn names(graph: &ParameterGraph) -> Vec<&str> {
        graph.argument_names().collect()
    }

    #[test]
    fn function_yields_tensor_and_dimension_arguments() {
        let graph = build_graph(
            vec![
                Dimension::space("x").into(),
                Function::new("u", DType::Float32, &["x"]).into(),
            ],
            Vec::new(),
        );
        assert_eq!(names(&graph), vec!["u", "x_size", "x_s", "x_e"]);
        assert_eq!(graph.dims.len(), 1);

        let x = graph.node(graph.find_dimension("x").unwrap());
        let edges: Vec<_> = x.gets_value_from().collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].param, Payload::Axis(0));
        assert!(matches!(edges[0].target, Target::Node(id) if id == graph.find_argument("u").unwrap()));
    }

    #[test]
    fn shared_dimension_collects_one_edge_per_tensor() {
        let graph = build_graph(
            vec![
                Function::new("u", DType::Float32, &["t", "x"]).into(),
                Function::new("v", DType::Float32, &["x"]).into(),
            ],
            Vec::new(),
        );
        let x = graph.node(graph.find_dimension("x").unwrap());
        let axes: Vec<Payload> = x.gets_value_from().map(|d| d.param).collect();
        assert_eq!(axes, vec![Payload::Axis(1), Payload::Axis(0)]);
        // Dimensions discovered through indices need not be declared.
        assert!(graph.find_dimension("t").is_some());
    }

    #[test]
    fn unreferenced_dimension_has_no_edges() {
        let graph = build_graph(vec![Dimension::new("z").into()], Vec::new());
        let z = graph.node(graph.find_dimension("z").unwrap());
        assert_eq!(z.dependencies.len(), 0);
        assert_eq!(names(&graph), vec!["z_size", "z_s", "z_e"]);
    }

    #[test]
    fn stepping_parent_takes_value_from_child() {
        let graph = build_graph(
            vec![
                Dimension::time("time").into(),
                Dimension::stepping("t", "time").into(),
                Function::new("u", DType::Float32, &["t", "x"]).into(),
            ],
            Vec::new(),
        );
        let t = graph.find_dimension("t").unwrap();
        let time = graph.node(graph.find_dimension("time").unwrap());
        assert!(time
            .gets_value_from()
            .any(|d| matches!(d.target, Target::Node(id) if id == t)));
    }

    #[test]
    fn tiling_descriptor_feeds_block_dimension() {
        let graph = build_graph(
            vec![Function::new("u", DType::Float32, &["x"]).into()],
            vec![TilingArgument::new("x0_blk", "x", TileSize::Extent)],
        );
        let blk = graph.node(graph.find_dimension("x0_blk").unwrap());
        let edges: Vec<_> = blk.gets_value_from().collect();
        assert_eq!(edges.len(), 1);
        assert!(matches!(
            edges[0].target,
            Target::Evaluator(Evaluator::TileSize)
        ));
        assert_eq!(edges[0].param, Payload::Tiling(0));
        assert!(graph.find_argument("x0_blk_size").is_some());
    }

    #[test]
    fn remaining_providers_map_to_argument_kinds() {
        let graph = build_graph(
            vec![
                Scalar::new("n", DType::Int32).into(),
                Constant::new("dt", DType::Float32, 0.5).into(),
                Object {
                    name: "timers".into(),
                    value: Handle { addr: 1 },
                }
                .into(),
                TempArray {
                    name: "r0".into(),
                    dtype: DType::Float32,
                    shape: vec![4],
                }
                .into(),
            ],
            Vec::new(),
        );
        assert_eq!(names(&graph), vec!["n", "dt", "timers", "r0"]);
        let dt = graph.node(graph.find_argument("dt").unwrap());
        assert_eq!(dt.defaults().count(), 1);
        assert_eq!(dt.gets_value_from().count(), 0);
        let timers = graph.node(graph.find_argument("timers").unwrap());
        assert!(matches!(timers.kind, NodeKind::Ptr { .. }));
        let r0 = graph.node(graph.find_argument("r0").unwrap());
        assert!(matches!(r0.kind, NodeKind::Tensor { .. }));
    }

    #[test]
    fn dimension_scalars_are_verified_non_negative() {
        let graph = build_graph(vec![Dimension::new("x").into()], Vec::new());
        let x_e = graph.node(graph.find_argument("x_e").unwrap());
        let checks: Vec<_> = x_e.verified_by().collect();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].kind, DependencyKind::VerifiedBy);
    }

    #[test]
    fn duplicate_names_keep_first_declaration() {
        let graph = build_graph(
            vec![
                Dimension::new("x").into(),
                Scalar::new("x_size", DType::Int64).into(),
            ],
            Vec::new(),
        );
        assert_eq!(names(&graph), vec!["x_size", "x_s", "x_e"]);
        let size = graph.node(graph.find_argument("x_size").unwrap());
        assert_eq!(size.dtype(), DType::Int32);
    }

    #[test]
    fn runtime_arguments_lists_names() {
        let args = runtime_arguments(&[
            Function::new("u", DType::Float32, &["x", "y"]).into(),
            Constant::new("c", DType::Float32, 1.0).into(),
        ]);
        assert_eq!(
            args,
            vec!["u", "x_size", "x_s", "x_e", "y_size", "y_s", "y_e", "c"]
        );
    }
}
