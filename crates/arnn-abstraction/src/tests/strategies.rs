use super::{layered_network, nd, pi};
use crate::*;
use arnn_core::{random_network, AbstractionStep, ArnnError, Network, NeuronId};
use std::collections::BTreeSet;

fn preprocessed(seed: u64) -> Network {
    preprocess(&random_network(2, &[3, 5, 5, 4], 1, seed).unwrap()).unwrap()
}

/// Every step the strategy plans for `network`.
fn drain<S: AbstractionStrategy>(strategy: &mut S, network: &Network) -> Vec<(usize, AbstractionStep)> {
    let mut steps = Vec::new();
    while let Some(step) = strategy.next(network).unwrap() {
        steps.push(step);
    }
    steps
}

#[test]
fn test_simple_steps_group_by_type() {
    let steps = simple_steps(&layered_network(), [2]).unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].1.new_name().name(), "a2+I");
    assert_eq!(steps[0].1.nodes(), &BTreeSet::from([pi("a"), pi("b")]));
    assert_eq!(steps[1].1.new_name().name(), "a2-D");
    assert_eq!(steps[1].1.nodes(), &BTreeSet::from([nd("d"), nd("e")]));
}

#[test]
fn test_simple_steps_reject_unclassified_layers() {
    let err = simple_steps(&layered_network(), [1]).unwrap_err();
    assert!(matches!(err, ArnnError::UnclassifiedNeuron(_)));
}

#[test]
fn test_complete_strategies_visit_layers_in_order() {
    let network = preprocessed(4);
    let forward = drain(&mut CompleteAbstractionLeftToRight::new(), &network);
    let backward = drain(&mut CompleteAbstractionRightToLeft::new(), &network);

    let forward_layers: Vec<usize> = forward.iter().map(|(l, _)| *l).collect();
    let backward_layers: Vec<usize> = backward.iter().map(|(l, _)| *l).collect();
    assert!(forward_layers.windows(2).all(|w| w[0] <= w[1]));
    assert!(backward_layers.windows(2).all(|w| w[0] >= w[1]));
    assert!(forward_layers.iter().all(|l| (2..network.layers_count() - 1).contains(l)));
    assert_eq!(forward.len(), backward.len());

    for (layer, step) in &forward {
        let neuron_type = step.nodes().first().and_then(NeuronId::neuron_type).unwrap();
        assert_eq!(step.new_name().name(), group_name(*layer, neuron_type));
    }
}

#[test]
fn test_complete_abstraction_leaves_one_neuron_per_type() {
    let network = preprocessed(9);
    let abstracted = abstract_network(&network, &mut CompleteAbstractionRightToLeft::new()).unwrap();
    for layer in 2..network.layers_count() - 1 {
        let types: BTreeSet<_> = abstracted.layer_ids(layer).iter().map(|id| id.neuron_type()).collect();
        assert_eq!(types.len(), abstracted.layer_ids(layer).len());
    }
}

#[test]
fn test_random_abstraction_partitions_type_groups() {
    let network = preprocessed(21);
    let steps = drain(&mut RandomAbstraction::new(5), &network);
    let again = drain(&mut RandomAbstraction::new(5), &network);
    assert_eq!(steps, again);

    let groups = simple_steps(&network, 2..network.layers_count() - 1).unwrap();
    let expected: BTreeSet<NeuronId> = groups.iter().flat_map(|(_, s)| s.nodes().iter().cloned()).collect();
    let mut covered = BTreeSet::new();
    for (layer, step) in &steps {
        assert!(step.nodes().len() >= 2);
        assert!(step.new_name().name().starts_with(&format!("a{layer}")));
        assert!(step.new_name().name().contains(':'));
        for node in step.nodes() {
            assert!(covered.insert(node.clone()), "{node:?} merged twice");
        }
    }
    assert_eq!(covered, expected);

    // the planned steps apply cleanly one after another
    assert!(abstract_network(&network, &mut RandomAbstraction::new(5)).is_ok());
}

#[test]
fn test_explicit_steps_locate_their_layer() {
    let network = layered_network();
    let step = AbstractionStep::new("de", [nd("d"), nd("e")]).unwrap();
    let mut strategy = ExplicitSteps::new([step.clone()]);
    assert_eq!(strategy.next(&network).unwrap(), Some((2, step)));
    assert_eq!(strategy.next(&network).unwrap(), None);
}

#[test]
fn test_explicit_steps_unknown_neuron() {
    let step = AbstractionStep::new("pq", [pi("p"), pi("q")]).unwrap();
    let err = ExplicitSteps::new([step]).next(&layered_network()).unwrap_err();
    assert!(matches!(err, ArnnError::UnknownNeuron(_)));
}
