// param.rs — Parameter graph: nodes, dependencies, arena
//
// Every runtime argument of a kernel, plus every dimension that feeds them,
// is a `Parameter` node. Dependencies are directed edges stored on the source
// node; their targets are referenced by index, never owned.
//
// Preconditions: none (types only).
// Postconditions: at most one dependency of a given kind between any ordered
//                 pair of nodes (enforced by `build`, not by these types).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::check::Check;
use crate::id::{NodeId, ProviderId};
use crate::provider::{Dimension, Provider};
use crate::tiling::TilingArgument;
use crate::value::{DType, Value};

// ── Dependencies ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Follow this edge to derive a value.
    GetsValueFrom,
    /// Follow this edge to verify a resolved value.
    VerifiedBy,
    /// Fall back to the provider's own declared default.
    Default,
}

/// Built-in evaluators a dependency may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Evaluator {
    /// Tile size of a tiling argument, from the runtime extent of the
    /// dimension it blocks.
    TileSize,
}

#[derive(Debug, Clone)]
pub enum Target {
    Node(NodeId),
    Provider(ProviderId),
    Evaluator(Evaluator),
    Literal(Value),
    Check(Check),
}

/// Auxiliary data needed to evaluate an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Payload {
    #[default]
    None,
    /// Axis of a tensor's runtime shape.
    Axis(usize),
    /// Index into the engine's tiling descriptors.
    Tiling(usize),
}

#[derive(Debug, Clone)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub target: Target,
    pub param: Payload,
}

impl Dependency {
    pub fn gets_value_from(target: Target) -> Self {
        Self {
            kind: DependencyKind::GetsValueFrom,
            target,
            param: Payload::None,
        }
    }

    pub fn verified_by(check: Check) -> Self {
        Self {
            kind: DependencyKind::VerifiedBy,
            target: Target::Check(check),
            param: Payload::None,
        }
    }

    pub fn default_from(provider: ProviderId) -> Self {
        Self {
            kind: DependencyKind::Default,
            target: Target::Provider(provider),
            param: Payload::None,
        }
    }

    pub fn with_param(mut self, param: Payload) -> Self {
        self.param = param;
        self
    }
}

// ── Nodes ───────────────────────────────────────────────────────────────────

/// Which of a dimension's three scalar arguments a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimRole {
    Size,
    Start,
    End,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A dimension. Not a kernel argument; source of size/start/end.
    Dimension(Dimension),
    Scalar {
        dtype: DType,
        /// Set when the scalar is one of a dimension's arguments.
        dim: Option<(NodeId, DimRole)>,
    },
    Tensor {
        dtype: DType,
        provider: ProviderId,
    },
    Ptr {
        dtype: DType,
        provider: ProviderId,
    },
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub dependencies: Vec<Dependency>,
}

impl Parameter {
    pub fn gets_value_from(&self) -> impl Iterator<Item = &Dependency> {
        self.of_kind(DependencyKind::GetsValueFrom)
    }

    pub fn verified_by(&self) -> impl Iterator<Item = &Dependency> {
        self.of_kind(DependencyKind::VerifiedBy)
    }

    pub fn defaults(&self) -> impl Iterator<Item = &Dependency> {
        self.of_kind(DependencyKind::Default)
    }

    fn of_kind(&self, kind: DependencyKind) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(move |d| d.kind == kind)
    }

    /// Kernel-visible argument (everything except dimensions).
    pub fn is_argument(&self) -> bool {
        !matches!(self.kind, NodeKind::Dimension(_))
    }

    pub fn as_dimension(&self) -> Option<&Dimension> {
        match &self.kind {
            NodeKind::Dimension(d) => Some(d),
            _ => None,
        }
    }

    pub fn dtype(&self) -> DType {
        match &self.kind {
            NodeKind::Dimension(_) => DType::Int32,
            NodeKind::Scalar { dtype, .. }
            | NodeKind::Tensor { dtype, .. }
            | NodeKind::Ptr { dtype, .. } => *dtype,
        }
    }

    /// Role of this node among `dim`'s scalar arguments, if any.
    pub fn dim_role(&self, dim: NodeId) -> Option<DimRole> {
        match self.kind {
            NodeKind::Scalar {
                dim: Some((owner, role)),
                ..
            } if owner == dim => Some(role),
            _ => None,
        }
    }
}

// ── Graph ───────────────────────────────────────────────────────────────────

/// The complete node arena plus the inputs it was built from.
#[derive(Debug, Clone)]
pub struct ParameterGraph {
    pub nodes: Vec<Parameter>,
    pub providers: Vec<Provider>,
    pub tiling: Vec<TilingArgument>,
    /// Kernel-visible arguments, in declaration order, unique by name.
    pub arguments: Vec<NodeId>,
    /// Dimension nodes.
    pub dims: Vec<NodeId>,
}

impl ParameterGraph {
    pub fn node(&self, id: NodeId) -> &Parameter {
        &self.nodes[id.index()]
    }

    pub fn provider(&self, id: ProviderId) -> &Provider {
        &self.providers[id.index()]
    }

    pub fn find_argument(&self, name: &str) -> Option<NodeId> {
        self.arguments
            .iter()
            .copied()
            .find(|id| self.node(*id).name == name)
    }

    pub fn find_dimension(&self, name: &str) -> Option<NodeId> {
        self.dims
            .iter()
            .copied()
            .find(|id| self.node(*id).name == name)
    }

    pub fn find_provider(&self, name: &str) -> Option<ProviderId> {
        self.providers
            .iter()
            .position(|p| p.name() == name)
            .map(|i| ProviderId(i as u32))
    }

    pub fn argument_names(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().map(|id| self.node(*id).name.as_str())
    }

    fn write_target(&self, f: &mut fmt::Formatter<'_>, dep: &Dependency) -> fmt::Result {
        match (&dep.target, dep.param) {
            (Target::Node(id), Payload::Axis(axis)) => {
                write!(f, "{}[{}]", self.node(*id).name, axis)
            }
            (Target::Node(id), _) => write!(f, "{}", self.node(*id).name),
            (Target::Provider(id), _) => write!(f, "provider:{}", self.provider(*id).name()),
            (Target::Evaluator(Evaluator::TileSize), Payload::Tiling(i)) => match self.tiling.get(i) {
                Some(t) => write!(f, "tile_size({}, {})", t.original_dim, t.value),
                None => write!(f, "tile_size(?)"),
            },
            (Target::Evaluator(Evaluator::TileSize), _) => write!(f, "tile_size(?)"),
            (Target::Literal(v), _) => write!(f, "{}", v),
            (Target::Check(c), _) => write!(f, "{}", c),
        }
    }

    fn write_deps<'a>(
        &self,
        f: &mut fmt::Formatter<'_>,
        label: &str,
        deps: impl Iterator<Item = &'a Dependency>,
    ) -> fmt::Result {
        let deps: Vec<&Dependency> = deps.collect();
        if deps.is_empty() {
            return Ok(());
        }
        write!(f, " {} ", label)?;
        for (i, dep) in deps.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            self.write_target(f, dep)?;
        }
        Ok(())
    }
}

impl fmt::Display for ParameterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ParameterGraph ({} arguments, {} dimensions)",
            self.arguments.len(),
            self.dims.len()
        )?;
        for node in &self.nodes {
            let kind = match &node.kind {
                NodeKind::Dimension(d) => format!("dimension({})", d.kind),
                NodeKind::Scalar { dtype, .. } => format!("scalar<{}>", dtype),
                NodeKind::Tensor { dtype, .. } => format!("tensor<{}>", dtype),
                NodeKind::Ptr { .. } => "object".to_string(),
            };
            write!(f, "  {} {}: {}", node.id, node.name, kind)?;
            self.write_deps(f, "<-", node.gets_value_from())?;
            self.write_deps(f, "default", node.defaults())?;
            self.write_deps(f, "verify", node.verified_by())?;
            writeln!(f)?;
        }
        Ok(())
    }
}
