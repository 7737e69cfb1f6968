//! Test suites for the abstraction crate.

mod refine;
mod strategies;

use arnn_core::{ActivationFunction, BiasTable, Network, NeuronId, Scaling, Sign, WeightsTable};
use ndarray::arr2;

pub(crate) fn pi(name: &str) -> NeuronId {
    NeuronId::classified(name, Sign::Pos, Scaling::Inc)
}

pub(crate) fn nd(name: &str) -> NeuronId {
    NeuronId::classified(name, Sign::Neg, Scaling::Dec)
}

/// x0, x1 -> h0, h1 -> {a, b: +I; d, e: -D} -> y
///
/// Layer 2 is the only layer open to abstraction.
pub(crate) fn layered_network() -> Network {
    let x = vec![NeuronId::new("x0"), NeuronId::new("x1")];
    let h = vec![NeuronId::new("h0"), NeuronId::new("h1")];
    let hidden = vec![pi("a"), pi("b"), nd("d"), nd("e")];
    let y = vec![NeuronId::new("y").with_scaling(Scaling::Inc)];
    Network::new(
        vec![
            WeightsTable::new(x.clone(), h.clone(), arr2(&[[1.0, 2.0], [3.0, -1.0]])).unwrap(),
            WeightsTable::new(
                h.clone(),
                hidden.clone(),
                arr2(&[[1.0, -2.0, 3.0, 0.5], [0.5, 4.0, -1.0, 2.0]]),
            )
            .unwrap(),
            WeightsTable::new(hidden.clone(), y.clone(), arr2(&[[1.0], [2.0], [-3.0], [-1.0]])).unwrap(),
        ],
        vec![
            BiasTable::zeros(x).unwrap(),
            BiasTable::new(h, vec![0.0, 1.0]).unwrap(),
            BiasTable::new(hidden, vec![0.5, -1.0, 2.0, 0.0]).unwrap(),
            BiasTable::zeros(y).unwrap(),
        ],
        vec![
            ActivationFunction::Id,
            ActivationFunction::Relu,
            ActivationFunction::Relu,
            ActivationFunction::Id,
        ],
    )
    .unwrap()
}

/// x0, x1 -> h0, h1 -> {a, b, c: +I} -> y
pub(crate) fn three_inc_network() -> Network {
    let x = vec![NeuronId::new("x0"), NeuronId::new("x1")];
    let h = vec![NeuronId::new("h0"), NeuronId::new("h1")];
    let hidden = vec![pi("a"), pi("b"), pi("c")];
    let y = vec![NeuronId::new("y").with_scaling(Scaling::Inc)];
    Network::new(
        vec![
            WeightsTable::new(x.clone(), h.clone(), arr2(&[[1.0, 0.0], [0.0, 1.0]])).unwrap(),
            WeightsTable::new(h.clone(), hidden.clone(), arr2(&[[1.0, 2.0, 3.0], [4.0, -1.0, 0.0]])).unwrap(),
            WeightsTable::new(hidden.clone(), y.clone(), arr2(&[[1.0], [2.0], [3.0]])).unwrap(),
        ],
        vec![
            BiasTable::zeros(x).unwrap(),
            BiasTable::zeros(h).unwrap(),
            BiasTable::new(hidden, vec![0.0, 1.0, -1.0]).unwrap(),
            BiasTable::zeros(y).unwrap(),
        ],
        vec![
            ActivationFunction::Id,
            ActivationFunction::Relu,
            ActivationFunction::Relu,
            ActivationFunction::Id,
        ],
    )
    .unwrap()
}
