//! Seeded random networks for tests and benchmarks.

use crate::{ActivationFunction, BiasTable, Network, NeuronId, Result, WeightsTable};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random fully connected network with integer weights and hidden biases in
/// `[-5, 5)`.
///
/// Neurons are named `x{i}` (inputs), `v{layer}:{i}` (hidden, 1-based) and
/// `y{i}` (outputs). Input and output biases are zero; hidden layers use
/// ReLU and the edge layers use the identity.
pub fn random_network(
    num_inputs: usize,
    hidden_layers: &[usize],
    num_outputs: usize,
    seed: u64,
) -> Result<Network> {
    let mut rng = StdRng::seed_from_u64(seed);
    random_network_with(num_inputs, hidden_layers, num_outputs, &mut rng)
}

/// [`random_network`] drawing from a caller-supplied generator.
pub fn random_network_with<R: Rng>(
    num_inputs: usize,
    hidden_layers: &[usize],
    num_outputs: usize,
    rng: &mut R,
) -> Result<Network> {
    let mut layers: Vec<Vec<NeuronId>> = Vec::with_capacity(hidden_layers.len() + 2);
    layers.push((0..num_inputs).map(|i| NeuronId::new(format!("x{i}"))).collect());
    for (l, &size) in hidden_layers.iter().enumerate() {
        layers.push(
            (1..=size)
                .map(|i| NeuronId::new(format!("v{}:{}", l + 1, i)))
                .collect(),
        );
    }
    layers.push((0..num_outputs).map(|i| NeuronId::new(format!("y{i}"))).collect());

    let last = layers.len() - 1;
    let mut biases = Vec::with_capacity(layers.len());
    for (idx, ids) in layers.iter().enumerate() {
        if idx == 0 || idx == last {
            biases.push(BiasTable::zeros(ids.clone())?);
        } else {
            let values = (0..ids.len()).map(|_| random_integer(rng)).collect();
            biases.push(BiasTable::new(ids.clone(), values)?);
        }
    }

    let weights = layers
        .windows(2)
        .map(|pair| {
            let values = Array2::from_shape_fn((pair[0].len(), pair[1].len()), |_| random_integer(rng));
            WeightsTable::new(pair[0].clone(), pair[1].clone(), values)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut activations = vec![ActivationFunction::Relu; layers.len()];
    activations[0] = ActivationFunction::Id;
    activations[last] = ActivationFunction::Id;

    Network::new(weights, biases, activations)
}

fn random_integer<R: Rng>(rng: &mut R) -> f64 {
    f64::from(rng.random_range(-5i32..5))
}
