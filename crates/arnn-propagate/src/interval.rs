//! Naive interval arithmetic over a [`Network`].

use crate::BoundEstimator;
use arnn_core::{ActivationFunction, Bound, Network, NeuronBounds, Result};
use arnn_property::{property_to_input_bounds, BasicProperty};
use ndarray::Array1;

/// Bounds of every neuron of `network` given bounds on its inputs.
///
/// Each weight matrix is split into its non-negative and non-positive parts
/// so that `lower' = lower·W⁺ + upper·W⁻ + b` and
/// `upper' = upper·W⁺ + lower·W⁻ + b`, then both ends of every layer,
/// output included, are floored at 0. The input layer's bias and activation
/// are applied before the first matrix, as in [`Network::evaluate_layers`].
/// Inputs missing from `input_bounds` are unbounded. Input neurons report
/// their raw bounds.
///
/// An empty input box yields inverted bounds downstream instead of an error.
pub fn evaluate_bounds_naive(network: &Network, input_bounds: &NeuronBounds) -> Result<NeuronBounds> {
    let inputs = network.input_ids();
    let raw: Vec<Bound> = inputs
        .iter()
        .map(|id| input_bounds.get(id).copied().unwrap_or_else(Bound::unbounded))
        .collect();

    let mut all = NeuronBounds::new();
    for (id, bound) in inputs.iter().zip(&raw) {
        all.insert(id.clone(), *bound);
    }

    let mut lower: Array1<f64> = raw.iter().map(|b| b.lower).collect();
    let mut upper: Array1<f64> = raw.iter().map(|b| b.upper).collect();
    let input_biases = network.biases()[0].values();
    lower += &input_biases;
    upper += &input_biases;
    if network.activations()[0] == ActivationFunction::Relu {
        floor(&mut lower, &mut upper);
    }

    for (i, w) in network.weights().iter().enumerate() {
        let pos = w.values().mapv(|v| v.max(0.0));
        let neg = w.values().mapv(|v| v.min(0.0));
        let biases = network.biases()[i + 1].values();

        let mut next_lower = lower.dot(&pos) + upper.dot(&neg);
        let mut next_upper = upper.dot(&pos) + lower.dot(&neg);
        next_lower += &biases;
        next_upper += &biases;
        floor(&mut next_lower, &mut next_upper);

        for (j, id) in w.dests().iter().enumerate() {
            let bound = Bound {
                lower: next_lower[j],
                upper: next_upper[j],
            };
            all.insert(id.clone(), bound);
        }
        lower = next_lower;
        upper = next_upper;
    }
    Ok(all)
}

fn floor(lower: &mut Array1<f64>, upper: &mut Array1<f64>) {
    lower.mapv_inplace(|v| v.max(0.0));
    upper.mapv_inplace(|v| v.max(0.0));
}

/// [`BoundEstimator`] backed by [`evaluate_bounds_naive`]. Only the input
/// constraints of the property are used.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalEstimator;

impl BoundEstimator for IntervalEstimator {
    fn estimate(&mut self, network: &Network, property: &BasicProperty) -> Result<NeuronBounds> {
        evaluate_bounds_naive(network, &property_to_input_bounds(property))
    }
}
