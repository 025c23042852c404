// tiling.rs — Tiling (loop blocking) argument descriptors
//
// A tiling argument is a block dimension whose size is computed from the
// runtime extent of the dimension it blocks. Only sizes computed as a true
// function of that extent can be searched by the autotuner.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Caller-supplied sizing function from extent to tile size.
#[derive(Clone)]
pub struct SizingFn {
    pub label: String,
    pub func: Arc<dyn Fn(i64) -> i64 + Send + Sync>,
}

impl SizingFn {
    pub fn new(label: impl Into<String>, func: impl Fn(i64) -> i64 + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for SizingFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SizingFn({})", self.label)
    }
}

/// How a tile size is obtained from the blocked dimension's extent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum TileSize {
    /// No sizing configured: the tile spans the whole extent.
    #[default]
    Extent,
    /// Fixed by configuration; not a function of the extent.
    Fixed { size: i64 },
    /// `extent / divisor`, at least 1.
    Fraction { divisor: i64 },
    #[serde(skip)]
    Function(SizingFn),
}

impl TileSize {
    /// Tile size for a known extent, and whether it is autotunable.
    pub fn apply(&self, extent: i64) -> (i64, bool) {
        match self {
            TileSize::Extent => (extent, true),
            TileSize::Fixed { size } => (*size, false),
            TileSize::Fraction { divisor } => ((extent / (*divisor).max(1)).max(1), true),
            TileSize::Function(f) => ((f.func)(extent), true),
        }
    }
}

impl fmt::Display for TileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileSize::Extent => write!(f, "extent"),
            TileSize::Fixed { size } => write!(f, "fixed({})", size),
            TileSize::Fraction { divisor } => write!(f, "extent/{}", divisor),
            TileSize::Function(s) => write!(f, "{}", s.label),
        }
    }
}

/// Blocking descriptor: `argument` is the block dimension fed by the
/// descriptor, `original_dim` the dimension it blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilingArgument {
    pub argument: String,
    pub original_dim: String,
    #[serde(default)]
    pub value: TileSize,
}

impl TilingArgument {
    pub fn new(argument: impl Into<String>, original_dim: impl Into<String>, value: TileSize) -> Self {
        Self {
            argument: argument.into(),
            original_dim: original_dim.into(),
            value,
        }
    }
}
