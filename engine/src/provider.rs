// provider.rs — Declared parameter providers
//
// Providers are the external entities a kernel was compiled against:
// dimensions, array-backed functions, temporary arrays, scalars, constants and
// opaque objects. The engine consumes them read-only; it never allocates or
// mutates their backing storage.
//
// Preconditions: provider names are unique; dimensions are identified by name.
// Postconditions: none (data-only module).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check::Check;
use crate::value::{ArrayValue, DType, Handle, Value};

// ── Dimensions ──────────────────────────────────────────────────────────────

pub fn size_name(dim: &str) -> String {
    format!("{}_size", dim)
}

pub fn start_name(dim: &str) -> String {
    format!("{}_s", dim)
}

pub fn end_name(dim: &str) -> String {
    format!("{}_e", dim)
}

fn default_modulo() -> u32 {
    2
}

fn default_factor() -> u32 {
    4
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DimensionKind {
    #[default]
    Plain,
    /// Axis of the physical grid.
    Space,
    /// Axis of time.
    Time,
    /// Modulo-buffered iteration over `parent`.
    Stepping {
        parent: String,
        #[serde(default = "default_modulo")]
        modulo: u32,
    },
    /// Iteration over `parent` with an increment of `factor`.
    Subsampled {
        parent: String,
        #[serde(default = "default_factor")]
        factor: u32,
    },
}

/// An iteration-space axis. Provides three scalar kernel arguments:
/// `<name>_size`, `<name>_s` and `<name>_e`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(default)]
    pub kind: DimensionKind,
    /// Traverse in reverse order.
    #[serde(default)]
    pub reverse: bool,
}

impl Dimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DimensionKind::Plain,
            reverse: false,
        }
    }

    pub fn space(name: impl Into<String>) -> Self {
        Self {
            kind: DimensionKind::Space,
            ..Self::new(name)
        }
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self {
            kind: DimensionKind::Time,
            ..Self::new(name)
        }
    }

    pub fn stepping(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            kind: DimensionKind::Stepping {
                parent: parent.into(),
                modulo: default_modulo(),
            },
            ..Self::new(name)
        }
    }

    pub fn subsampled(name: impl Into<String>, parent: impl Into<String>, factor: u32) -> Self {
        Self {
            kind: DimensionKind::Subsampled {
                parent: parent.into(),
                factor,
            },
            ..Self::new(name)
        }
    }

    pub fn is_stepping(&self) -> bool {
        matches!(self.kind, DimensionKind::Stepping { .. })
    }

    pub fn parent(&self) -> Option<&str> {
        match &self.kind {
            DimensionKind::Stepping { parent, .. } | DimensionKind::Subsampled { parent, .. } => {
                Some(parent)
            }
            _ => None,
        }
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionKind::Plain => write!(f, "plain"),
            DimensionKind::Space => write!(f, "space"),
            DimensionKind::Time => write!(f, "time"),
            DimensionKind::Stepping { parent, modulo } => {
                write!(f, "stepping({} mod {})", parent, modulo)
            }
            DimensionKind::Subsampled { parent, factor } => {
                write!(f, "subsampled({} / {})", parent, factor)
            }
        }
    }
}

// ── Value-bearing providers ─────────────────────────────────────────────────

/// A function over a set of dimensions, backed by a materialized array.
///
/// A function that names `children` is composite: callers may pass a
/// `Value::Composite` for it, whose child values replace the children's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default = "float32")]
    pub dtype: DType,
    /// Indexing dimensions, by name, in axis order.
    pub indices: Vec<String>,
    /// Backing array; `None` until the caller supplies one.
    #[serde(default)]
    pub data: Option<ArrayValue>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub checks: Vec<Check>,
}

fn float32() -> DType {
    DType::Float32
}

impl Function {
    pub fn new(name: impl Into<String>, dtype: DType, indices: &[&str]) -> Self {
        Self {
            name: name.into(),
            dtype,
            indices: indices.iter().map(|s| s.to_string()).collect(),
            data: None,
            children: Vec::new(),
            checks: Vec::new(),
        }
    }

    /// Attach a backing array of the given shape.
    pub fn with_shape(mut self, shape: &[usize]) -> Self {
        self.data = Some(ArrayValue::new(self.dtype, shape.to_vec()));
        self
    }

    pub fn with_children(mut self, children: &[&str]) -> Self {
        self.children = children.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }
}

/// A kernel-local temporary array. Its value is a fresh array of the
/// declared shape unless the caller passes one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempArray {
    pub name: String,
    #[serde(default = "float32")]
    pub dtype: DType,
    pub shape: Vec<usize>,
}

/// A plain scalar, optionally with a declared default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scalar {
    pub name: String,
    #[serde(default)]
    pub dtype: DType,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub checks: Vec<Check>,
}

impl Scalar {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
            default: None,
            checks: Vec::new(),
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }
}

/// A named constant whose declared value is the default argument value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    #[serde(default = "float32")]
    pub dtype: DType,
    pub value: Value,
    #[serde(default)]
    pub checks: Vec<Check>,
}

impl Constant {
    pub fn new(name: impl Into<String>, dtype: DType, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            dtype,
            value: value.into(),
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }
}

/// An opaque object passed by handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    pub name: String,
    pub value: Handle,
}

// ── Provider ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum Provider {
    Dimension(Dimension),
    Function(Function),
    Array(TempArray),
    Scalar(Scalar),
    Constant(Constant),
    Object(Object),
}

impl Provider {
    pub fn name(&self) -> &str {
        match self {
            Provider::Dimension(d) => &d.name,
            Provider::Function(f) => &f.name,
            Provider::Array(a) => &a.name,
            Provider::Scalar(s) => &s.name,
            Provider::Constant(c) => &c.name,
            Provider::Object(o) => &o.name,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Provider::Dimension(_) => DType::Int32,
            Provider::Function(f) => f.dtype,
            Provider::Array(a) => a.dtype,
            Provider::Scalar(s) => s.dtype,
            Provider::Constant(c) => c.dtype,
            Provider::Object(_) => DType::Ptr,
        }
    }

    /// Checks declared on the provider itself.
    pub fn checks(&self) -> &[Check] {
        match self {
            Provider::Function(f) => &f.checks,
            Provider::Scalar(s) => &s.checks,
            Provider::Constant(c) => &c.checks,
            Provider::Dimension(_) | Provider::Array(_) | Provider::Object(_) => &[],
        }
    }

    pub fn as_dimension(&self) -> Option<&Dimension> {
        match self {
            Provider::Dimension(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Provider::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl From<Dimension> for Provider {
    fn from(d: Dimension) -> Self {
        Provider::Dimension(d)
    }
}

impl From<Function> for Provider {
    fn from(f: Function) -> Self {
        Provider::Function(f)
    }
}

impl From<Scalar> for Provider {
    fn from(s: Scalar) -> Self {
        Provider::Scalar(s)
    }
}

impl From<Constant> for Provider {
    fn from(c: Constant) -> Self {
        Provider::Constant(c)
    }
}

impl From<TempArray> for Provider {
    fn from(a: TempArray) -> Self {
        Provider::Array(a)
    }
}

impl From<Object> for Provider {
    fn from(o: Object) -> Self {
        Provider::Object(o)
    }
}
