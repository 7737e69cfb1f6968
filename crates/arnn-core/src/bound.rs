use crate::NeuronId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel magnitude standing in for an unbounded value.
pub const INF: f64 = 1e38;

/// A bound on a scalar value: [lower, upper].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    #[inline]
    pub fn new(lower: f64, upper: f64) -> Self {
        debug_assert!(lower <= upper, "Invalid bound: {lower} > {upper}");
        Self { lower, upper }
    }

    /// `[-INF, INF]`.
    #[inline]
    pub fn unbounded() -> Self {
        Self {
            lower: -INF,
            upper: INF,
        }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Per-neuron bounds.
pub type NeuronBounds = BTreeMap<NeuronId, Bound>;
