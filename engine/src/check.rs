// check.rs — Verification predicates attached to arguments
//
// A `Check` is the target of a `VerifiedBy` dependency. Checks only ever see
// fully resolved values.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Caller-supplied predicate over a resolved value.
#[derive(Clone)]
pub struct PredicateFn {
    pub label: String,
    pub func: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl PredicateFn {
    pub fn new(label: impl Into<String>, func: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for PredicateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PredicateFn({})", self.label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Check {
    /// Integer or float value must be `>= 0`.
    NonNegative,
    /// Numeric value must lie in `[min, max]`; either bound may be open.
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Array value must have exactly this many axes.
    Rank { rank: usize },
    #[serde(skip)]
    Custom(PredicateFn),
}

impl Check {
    pub fn holds(&self, value: &Value) -> bool {
        match self {
            Check::NonNegative => value.as_f64().is_some_and(|v| v >= 0.0),
            Check::Range { min, max } => match value.as_f64() {
                Some(v) => min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m),
                None => false,
            },
            Check::Rank { rank } => value.as_array().is_some_and(|a| a.shape.len() == *rank),
            Check::Custom(p) => (p.func)(value),
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::NonNegative => write!(f, "non_negative"),
            Check::Range { min, max } => {
                let lo = min.map_or("-inf".to_string(), |m| m.to_string());
                let hi = max.map_or("inf".to_string(), |m| m.to_string());
                write!(f, "range[{}, {}]", lo, hi)
            }
            Check::Rank { rank } => write!(f, "rank({})", rank),
            Check::Custom(p) => write!(f, "{}", p.label),
        }
    }
}
