//! Winner/runner-up properties over output neurons.

use crate::{BasicConstraint, BasicProperty};
use arnn_core::{ArnnError, BiasTable, Network, NeuronId, Result, WeightsTable};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Name of the output neuron appended by [`prepare_network_adversarial`].
pub const ADVERSARIAL_OUTPUT_NEURON: &str = "c";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdversarialProperty {
    pub input_constraints: Vec<BasicConstraint>,
    /// Lower bounds here rank the output neurons; other constraints are
    /// ignored.
    pub output_constraints: Vec<BasicConstraint>,
    pub minimal_is_the_winner: bool,
    #[serde(default)]
    pub slack: f64,
}

/// Winner and runner-up among the lower-bounded outputs.
///
/// Candidates are ranked by `(bound, neuron)`: largest first, or smallest
/// first when `minimal_is_the_winner` is set.
pub fn find_winner_and_runnerup(property: &AdversarialProperty) -> Result<(NeuronId, NeuronId)> {
    let better = |a: &(f64, &NeuronId), b: &(f64, &NeuronId)| {
        let ord = a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1));
        if property.minimal_is_the_winner {
            ord == Ordering::Less
        } else {
            ord == Ordering::Greater
        }
    };

    let mut winner: Option<(f64, &NeuronId)> = None;
    let mut runnerup: Option<(f64, &NeuronId)> = None;
    for constraint in property.output_constraints.iter().filter(|c| c.is_lower()) {
        let current = (constraint.value(), constraint.neuron());
        if winner.as_ref().map_or(true, |w| better(&current, w)) {
            runnerup = winner;
            winner = Some(current);
        } else if runnerup.as_ref().map_or(true, |r| better(&current, r)) {
            runnerup = Some(current);
        }
    }

    match (winner, runnerup) {
        (Some(w), Some(r)) => Ok((w.1.clone(), r.1.clone())),
        _ => Err(ArnnError::InvalidProperty(
            "an adversarial property needs at least two lower-bounded outputs".to_string(),
        )),
    }
}

/// Replace the output layer with a single neuron `c` computing
/// `±(y_winner - y_runnerup) - slack` and require `c >= 0`.
///
/// The sign is `+` unless `minimal_is_the_winner` is set.
pub fn prepare_network_adversarial(
    network: &Network,
    property: &AdversarialProperty,
) -> Result<(Network, BasicProperty)> {
    let (winner, runnerup) = find_winner_and_runnerup(property)?;
    debug!(%winner, %runnerup, "adversarial property");

    let last = network.layers_count() - 2;
    let weights = &network.weights()[last];
    let biases = &network.biases()[last + 1];
    let column = |id: &NeuronId| {
        weights
            .dest_index(id)
            .ok_or_else(|| ArnnError::UnknownNeuron(format!("output {id:?}")))
    };
    let (w, r) = (column(&winner)?, column(&runnerup)?);
    let sign = if property.minimal_is_the_winner { -1.0 } else { 1.0 };

    let values = weights.values();
    let diff: Vec<f64> = values
        .rows()
        .into_iter()
        .map(|row| sign * (row[w] - row[r]))
        .collect();
    let n = diff.len();
    let bias = |id: &NeuronId| {
        biases
            .get(id)
            .ok_or_else(|| ArnnError::UnknownNeuron(format!("output bias {id:?}")))
    };
    let (bias_w, bias_r) = (bias(&winner)?, bias(&runnerup)?);
    let bias = sign * (bias_w - bias_r) - property.slack;

    let output = NeuronId::new(ADVERSARIAL_OUTPUT_NEURON);
    let new_weights = WeightsTable::new(
        weights.srcs().to_vec(),
        vec![output.clone()],
        Array2::from_shape_vec((n, 1), diff).map_err(|e| ArnnError::structural(e.to_string()))?,
    )?;
    let new_biases = BiasTable::new(vec![output.clone()], vec![bias])?;

    let (mut all_weights, mut all_biases, activations) = network.clone().into_parts();
    all_weights[last] = Arc::new(new_weights);
    all_biases[last + 1] = Arc::new(new_biases);
    let new_network = Network::from_shared(all_weights, all_biases, activations)?;

    let new_property = BasicProperty::new(
        property.input_constraints.clone(),
        vec![BasicConstraint::lower(output, 0.0)],
    );
    Ok((new_network, new_property))
}
