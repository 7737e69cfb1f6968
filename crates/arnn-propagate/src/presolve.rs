use crate::BoundEstimator;
use arnn_core::{Network, NeuronBounds, Result};
use arnn_property::{property_to_bounds, BasicProperty};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// An external bound tightener, typically the oracle's own preprocessing.
pub trait Presolver {
    /// Tightened bounds of the input and output neurons of `network` under
    /// the known `bounds`. Sides at `±INF` are unconstrained.
    fn presolve(&mut self, network: &Network, bounds: &NeuronBounds) -> Result<NeuronBounds>;
}

/// [`BoundEstimator`] delegating to a [`Presolver`] with both input and
/// output constraints of the property.
///
/// Results are memoized by network and bound content. The cache only saves
/// presolver calls; a miss recomputes the same bounds.
pub struct PresolveEstimator<P> {
    presolver: P,
    cache: HashMap<u64, NeuronBounds>,
}

impl<P: Presolver> PresolveEstimator<P> {
    pub fn new(presolver: P) -> Self {
        Self {
            presolver,
            cache: HashMap::new(),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

fn cache_key(network: &Network, bounds: &NeuronBounds) -> u64 {
    let mut hasher = DefaultHasher::new();
    network.fingerprint().hash(&mut hasher);
    for (id, bound) in bounds {
        id.hash(&mut hasher);
        bound.lower.to_bits().hash(&mut hasher);
        bound.upper.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

impl<P: Presolver> BoundEstimator for PresolveEstimator<P> {
    fn estimate(&mut self, network: &Network, property: &BasicProperty) -> Result<NeuronBounds> {
        let bounds = property_to_bounds(property);
        let key = cache_key(network, &bounds);
        if let Some(hit) = self.cache.get(&key) {
            debug!(key, "presolve cache hit");
            return Ok(hit.clone());
        }
        let result = self.presolver.presolve(network, &bounds)?;
        self.cache.insert(key, result.clone());
        Ok(result)
    }
}
