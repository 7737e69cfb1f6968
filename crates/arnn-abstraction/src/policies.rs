//! Refinement policies: which abstract neurons to split after a spurious
//! example.
//!
//! A policy reads what it needs from a [`RefinementContext`] and returns an
//! ordered list of `(layer, step)` operations. Policies only select
//! originals that are still hidden in an abstract neuron; an empty list
//! means there is nothing left to refine.

use crate::refine::Step;
use crate::utils::{
    grouped_refinement_steps_from_original_nodes, network_abstracted_neurons, original_to_abstract_mapping,
    refinement_steps_from_original_nodes, NeuronIdGenerator,
};
use arnn_core::{ArnnError, Network, NeuronId, NeuronValues, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Everything a policy may look at.
#[derive(Debug, Clone, Copy)]
pub struct RefinementContext<'a> {
    pub network: &'a Network,
    pub spurious_example: Option<&'a NeuronValues>,
    /// Values of the original network's neurons on the spurious example.
    pub activations: Option<&'a NeuronValues>,
}

impl<'a> RefinementContext<'a> {
    pub fn new(network: &'a Network) -> Self {
        Self {
            network,
            spurious_example: None,
            activations: None,
        }
    }

    pub fn with_spurious_example(mut self, example: &'a NeuronValues) -> Self {
        self.spurious_example = Some(example);
        self
    }

    pub fn with_activations(mut self, activations: &'a NeuronValues) -> Self {
        self.activations = Some(activations);
        self
    }

    /// Same context over another network.
    pub fn with_network<'b>(&self, network: &'b Network) -> RefinementContext<'b>
    where
        'a: 'b,
    {
        RefinementContext {
            network,
            spurious_example: self.spurious_example,
            activations: self.activations,
        }
    }
}

pub trait RefinementPolicy {
    fn steps(&mut self, context: &RefinementContext<'_>) -> Result<Vec<(usize, Step)>>;
}

// ============================================================================
// Random
// ============================================================================

/// Uniformly sample up to `max_per_step` hidden originals network-wide and
/// split them out of their abstract neurons.
#[derive(Debug)]
pub struct RandomRefine {
    max_per_step: usize,
    rng: StdRng,
}

impl RandomRefine {
    pub fn new(max_per_step: usize, seed: u64) -> Self {
        Self {
            max_per_step,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Reservoir sample of at most `n` items.
    fn sample<T>(&mut self, items: impl IntoIterator<Item = T>, n: usize) -> Vec<T> {
        let mut reservoir = Vec::with_capacity(n);
        for (t, item) in items.into_iter().enumerate() {
            if t < n {
                reservoir.push(item);
            } else {
                let m = self.rng.random_range(0..=t);
                if m < n {
                    reservoir[m] = item;
                }
            }
        }
        reservoir
    }
}

impl RefinementPolicy for RandomRefine {
    fn steps(&mut self, context: &RefinementContext<'_>) -> Result<Vec<(usize, Step)>> {
        let originals = original_to_abstract_mapping(context.network).into_keys();
        let sample = self.sample(originals, self.max_per_step);
        debug!(sampled = sample.len(), "random refinement");
        refinement_steps_from_original_nodes(&sample, context.network)
    }
}

// ============================================================================
// Max weight divergence
// ============================================================================

/// Sum, per hidden original, of `|abstract weight - original weight|` over
/// every edge it lost precision on.
///
/// Both ends of an edge are charged: the original behind an abstract source
/// and the original behind an abstract destination.
pub fn original_edges_weights_diff(network: &Network) -> Result<BTreeMap<NeuronId, f64>> {
    let mut diff: BTreeMap<NeuronId, f64> = BTreeMap::new();
    for table in network.weights() {
        if !table.is_abstracted() {
            continue;
        }
        let origin = table.origin();
        let src_index: HashMap<&NeuronId, usize> = origin.srcs().iter().enumerate().map(|(i, s)| (s, i)).collect();
        let dest_index: HashMap<&NeuronId, usize> =
            origin.dests().iter().enumerate().map(|(j, d)| (d, j)).collect();
        let position = |index: &HashMap<&NeuronId, usize>, id: &NeuronId| {
            index
                .get(id)
                .copied()
                .ok_or_else(|| ArnnError::structural(format!("{id:?} is missing from the origin table")))
        };

        for (i, src) in table.srcs().iter().enumerate() {
            for (j, dest) in table.dests().iter().enumerate() {
                if !src.is_abstract() && !dest.is_abstract() {
                    continue;
                }
                let weight = table.values()[[i, j]];
                let dests = dest.flattened();
                for original_src in src.flattened() {
                    let oi = position(&src_index, &original_src)?;
                    for original_dest in &dests {
                        let oj = position(&dest_index, original_dest)?;
                        let loss = (origin.values()[[oi, oj]] - weight).abs();
                        if src.is_abstract() {
                            *diff.entry(original_src.clone()).or_default() += loss;
                        }
                        if dest.is_abstract() {
                            *diff.entry(original_dest.clone()).or_default() += loss;
                        }
                    }
                }
            }
        }
    }
    Ok(diff)
}

/// Hidden originals sorted by decreasing weight divergence, ties in neuron
/// order.
fn top_divergence(network: &Network, limit: usize) -> Result<Vec<(NeuronId, f64)>> {
    let mut ranked: Vec<(NeuronId, f64)> = original_edges_weights_diff(network)?.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(limit);
    Ok(ranked)
}

/// Split out the `sequence_len` originals with the largest weight divergence.
#[derive(Debug, Clone)]
pub struct RefineByMaxLoss {
    sequence_len: usize,
}

impl RefineByMaxLoss {
    pub fn new(sequence_len: usize) -> Self {
        Self { sequence_len }
    }
}

impl Default for RefineByMaxLoss {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RefinementPolicy for RefineByMaxLoss {
    fn steps(&mut self, context: &RefinementContext<'_>) -> Result<Vec<(usize, Step)>> {
        let top = top_divergence(context.network, self.sequence_len)?;
        debug!(selected = top.len(), max_loss = top.first().map(|(_, l)| *l), "max-loss refinement");
        refinement_steps_from_original_nodes(top.iter().map(|(id, _)| id), context.network)
    }
}

// ============================================================================
// Max weight divergence, clustered
// ============================================================================

/// Like [`RefineByMaxLoss`], but the selected originals are clustered by
/// score and each cluster is merged back into a fresh abstract neuron
/// instead of being exposed one by one.
///
/// The cluster count is twice the number of abstract neurons the selection
/// touches.
#[derive(Debug, Clone)]
pub struct RefineByMaxLossClustered {
    sequence_len: usize,
    generators: BTreeMap<usize, NeuronIdGenerator>,
}

impl RefineByMaxLossClustered {
    pub fn new(sequence_len: usize) -> Self {
        Self {
            sequence_len,
            generators: BTreeMap::new(),
        }
    }
}

impl RefinementPolicy for RefineByMaxLossClustered {
    fn steps(&mut self, context: &RefinementContext<'_>) -> Result<Vec<(usize, Step)>> {
        let top = top_divergence(context.network, self.sequence_len)?;
        if top.is_empty() {
            return Ok(Vec::new());
        }
        let mapping = original_to_abstract_mapping(context.network);
        let touched: BTreeSet<&(usize, NeuronId)> = top.iter().filter_map(|(id, _)| mapping.get(id)).collect();
        let losses: Vec<f64> = top.iter().map(|(_, loss)| *loss).collect();
        let labels = natural_breaks(&losses, 2 * touched.len());

        let mut groups: Vec<(Option<String>, Vec<NeuronId>)> = Vec::new();
        let mut start = 0;
        while start < top.len() {
            let end = (start..top.len())
                .find(|&k| labels[k] != labels[start])
                .unwrap_or(top.len());
            let mut by_abstract: BTreeMap<&(usize, NeuronId), Vec<NeuronId>> = BTreeMap::new();
            for (id, _) in &top[start..end] {
                if let Some(key) = mapping.get(id) {
                    by_abstract.entry(key).or_default().push(id.clone());
                }
            }
            groups.extend(by_abstract.into_values().map(|group| (None, group)));
            start = end;
        }
        debug!(selected = top.len(), groups = groups.len(), "clustered max-loss refinement");
        grouped_refinement_steps_from_original_nodes(&groups, context.network, &mut self.generators)
    }
}

/// Cluster label of each value: an optimal split of the sequence into
/// `classes` contiguous runs minimizing the summed squared deviation from
/// each run's mean (Jenks natural breaks, for sorted input).
///
/// With no more values than classes, every value gets its own label.
pub fn natural_breaks(values: &[f64], classes: usize) -> Vec<usize> {
    let n = values.len();
    if n <= classes {
        return (0..n).collect();
    }
    if classes <= 1 {
        return vec![0; n];
    }

    let mut sum = vec![0.0; n + 1];
    let mut sum_sq = vec![0.0; n + 1];
    for (i, v) in values.iter().enumerate() {
        sum[i + 1] = sum[i] + v;
        sum_sq[i + 1] = sum_sq[i] + v * v;
    }
    // squared deviation of values[i..j]
    let cost = |i: usize, j: usize| {
        let len = (j - i) as f64;
        let s = sum[j] - sum[i];
        (sum_sq[j] - sum_sq[i] - s * s / len).max(0.0)
    };

    // best[c][j]: cost of splitting values[..j] into c + 1 runs
    let mut best = vec![vec![f64::INFINITY; n + 1]; classes];
    let mut split = vec![vec![0usize; n + 1]; classes];
    for j in 1..=n {
        best[0][j] = cost(0, j);
    }
    for c in 1..classes {
        for j in (c + 1)..=n {
            for i in c..j {
                let candidate = best[c - 1][i] + cost(i, j);
                if candidate < best[c][j] {
                    best[c][j] = candidate;
                    split[c][j] = i;
                }
            }
        }
    }

    let mut labels = vec![0; n];
    let mut end = n;
    for c in (0..classes).rev() {
        let start = if c == 0 { 0 } else { split[c][end] };
        labels[start..end].fill(c);
        end = start;
    }
    labels
}

// ============================================================================
// Max activation
// ============================================================================

/// Split out the `max_per_step` hidden originals with the largest value on
/// the spurious example. Needs [`RefinementContext::activations`].
#[derive(Debug, Clone)]
pub struct RefineByMaxActivations {
    max_per_step: usize,
}

impl RefineByMaxActivations {
    pub fn new(max_per_step: usize) -> Self {
        Self { max_per_step }
    }
}

impl RefinementPolicy for RefineByMaxActivations {
    fn steps(&mut self, context: &RefinementContext<'_>) -> Result<Vec<(usize, Step)>> {
        let activations = context
            .activations
            .ok_or_else(|| ArnnError::Config("max-activation refinement needs activations".to_string()))?;
        let mapping = original_to_abstract_mapping(context.network);
        let mut ranked: Vec<(&NeuronId, f64)> = activations
            .iter()
            .filter(|(id, _)| mapping.contains_key(*id))
            .map(|(id, v)| (id, *v))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(self.max_per_step);
        debug!(
            selected = ranked.len(),
            abstract_neurons = network_abstracted_neurons(context.network).len(),
            "max-activation refinement"
        );
        refinement_steps_from_original_nodes(ranked.into_iter().map(|(id, _)| id), context.network)
    }
}
