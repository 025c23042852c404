// stencil.rs — Stencils and halo offsets
//
// A stencil maps each dimension it touches to the set of relative offsets it
// reads at. The halo offset of a dimension is the largest absolute offset any
// stencil reads along it; the engine adds it to user-supplied end values.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stencil(pub IndexMap<String, BTreeSet<i64>>);

impl Stencil {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `offsets` along `dim`, merging with offsets already recorded.
    pub fn with(mut self, dim: impl Into<String>, offsets: &[i64]) -> Self {
        self.0
            .entry(dim.into())
            .or_default()
            .extend(offsets.iter().copied());
        self
    }

    pub fn dims(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn offsets(&self, dim: &str) -> Option<&BTreeSet<i64>> {
        self.0.get(dim)
    }
}

/// Per-dimension halo offset: `max(|offset|)` over every stencil, in order of
/// first appearance. An offset of `i64::MIN` saturates to `i64::MAX`.
pub fn retrieve_offsets(stencils: &[Stencil]) -> IndexMap<String, i64> {
    let mut offsets: IndexMap<String, i64> = IndexMap::new();
    for stencil in stencils {
        for (dim, offs) in &stencil.0 {
            let extent = offs
                .iter()
                .map(|o| i64::try_from(o.unsigned_abs()).unwrap_or(i64::MAX))
                .max()
                .unwrap_or(0);
            let entry = offsets.entry(dim.clone()).or_insert(0);
            *entry = (*entry).max(extent);
        }
    }
    offsets
}
