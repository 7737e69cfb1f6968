use super::{layered_network, nd, pi, three_inc_network};
use crate::*;
use arnn_core::{AbstractionStep, ArnnError, Network, NeuronId, NeuronValues, Result, Scaling};
use arnn_property::{is_satisfying_assignment, BasicConstraint, BasicProperty};
use ndarray::arr2;
use std::collections::{BTreeSet, VecDeque};

fn abstract_all(network: &Network, name: &str) -> (Network, NeuronId) {
    let step = AbstractionStep::new(name, network.layer_ids(2).iter().cloned()).unwrap();
    let id = step.new_name().clone();
    (apply_abstraction(network, 2, &step).unwrap(), id)
}

fn assert_same_layer(a: &Network, b: &Network, layer: usize) {
    assert_eq!(*a.weights()[layer - 1], *b.weights()[layer - 1]);
    assert_eq!(*a.weights()[layer], *b.weights()[layer]);
    assert_eq!(*a.biases()[layer], *b.biases()[layer]);
}

#[test]
fn test_full_refinement_restores_concrete_tables() {
    let network = three_inc_network();
    let (abstracted, abc) = abstract_all(&network, "abc");
    let refined = apply_refinement(&abstracted, 2, &RefinementStep::full(abc)).unwrap();
    assert_same_layer(&refined, &network, 2);
    assert!(refined.weights()[1].history().is_empty());
    assert!(refined.biases()[2].as_table().history().is_empty());
}

#[test]
fn test_partial_refinement_keeps_smaller_abstract_neuron() {
    let (abstracted, abc) = abstract_all(&three_inc_network(), "abc");
    let refined = apply_refinement(&abstracted, 2, &RefinementStep::partial(abc.clone(), [pi("a")])).unwrap();

    let layer = refined.layer_ids(2);
    assert_eq!(layer, [pi("a"), abc.clone()]);
    assert_eq!(layer[1].original_neurons(), &BTreeSet::from([pi("b"), pi("c")]));
    assert_eq!(*refined.weights()[1].values(), arr2(&[[1.0, 3.0], [4.0, 0.0]]));
    assert_eq!(*refined.weights()[2].values(), arr2(&[[1.0], [5.0]]));
    assert_eq!(refined.biases()[2].values().to_vec(), vec![0.0, 1.0]);
}

#[test]
fn test_partial_refinement_leaving_one_neuron_is_full() {
    let network = layered_network();
    let step = AbstractionStep::new("ab", [pi("a"), pi("b")]).unwrap();
    let abstracted = apply_abstraction(&network, 2, &step).unwrap();
    let refined = apply_refinement(
        &abstracted,
        2,
        &RefinementStep::partial(step.new_name().clone(), [pi("a")]),
    )
    .unwrap();
    assert_same_layer(&refined, &network, 2);
}

#[test]
fn test_refinement_through_nested_merges() {
    let network = three_inc_network();
    let ab = AbstractionStep::new("ab", [pi("a"), pi("b")]).unwrap();
    let nested = AbstractionStep::new("abc", [ab.new_name().clone(), pi("c")]).unwrap();
    let abstracted = abstract_network(&network, &mut ExplicitSteps::new([ab, nested.clone()])).unwrap();
    assert_eq!(
        abstracted.layer_ids(2)[0].original_neurons(),
        &BTreeSet::from([pi("a"), pi("b"), pi("c")])
    );

    let step = RefinementStep::partial(nested.new_name().clone(), [pi("a")]);
    let refined = apply_refinement(&abstracted, 2, &step).unwrap();

    let (flat, abc) = abstract_all(&network, "abc");
    let expected = apply_refinement(&flat, 2, &RefinementStep::partial(abc, [pi("a")])).unwrap();
    assert_same_layer(&refined, &expected, 2);
    assert_eq!(refined.weights()[1].history().len(), 1);
}

#[test]
fn test_replay_keeps_merges_of_neighbouring_layers() {
    let network = arnn_core::random_network(2, &[3, 4, 4], 1, 11).unwrap();
    let network = preprocess(&network).unwrap();
    let abstracted = abstract_network(&network, &mut CompleteAbstractionLeftToRight::new()).unwrap();

    // refine every abstract neuron of layer 2, layer 3 stays abstract
    let mut refined = abstracted.clone();
    for id in abstracted.layer_ids(2).iter().filter(|id| id.is_abstract()) {
        refined = apply_refinement(&refined, 2, &RefinementStep::full(id.clone())).unwrap();
    }
    assert_eq!(refined.layer_ids(2), network.layer_ids(2));
    assert_eq!(refined.layer_ids(3), abstracted.layer_ids(3));
    assert_eq!(*refined.weights()[2], *abstracted_layer_3_only(&network).weights()[2]);
}

fn abstracted_layer_3_only(network: &Network) -> Network {
    let steps = simple_steps(network, [3]).unwrap();
    abstract_network(network, &mut ExplicitSteps::new(steps.into_iter().map(|(_, step)| step))).unwrap()
}

#[test]
fn test_invalid_refinement_steps() {
    let (abstracted, abc) = abstract_all(&three_inc_network(), "abc");
    let cases = [
        RefinementStep::full(pi("zzz")),
        RefinementStep::partial(abc.clone(), Vec::<NeuronId>::new()),
        RefinementStep::partial(abc.clone(), [pi("q")]),
    ];
    for step in cases {
        let err = apply_refinement(&abstracted, 2, &step).unwrap_err();
        assert!(matches!(err, ArnnError::InvalidRefinementStep(_)), "{step:?}: {err:?}");
    }

    // concrete neurons cannot be refined
    let err = apply_refinement(&layered_network(), 2, &RefinementStep::full(pi("a"))).unwrap_err();
    assert!(matches!(err, ArnnError::InvalidRefinementStep(_)));
}

/// Hands out prepared rounds of steps, then nothing.
struct ScriptedPolicy {
    rounds: VecDeque<Vec<(usize, Step)>>,
}

impl RefinementPolicy for ScriptedPolicy {
    fn steps(&mut self, _: &RefinementContext<'_>) -> Result<Vec<(usize, Step)>> {
        Ok(self.rounds.pop_front().unwrap_or_default())
    }
}

#[test]
fn test_refine_network_statistics() {
    let (abstracted, abc) = abstract_all(&three_inc_network(), "abc");
    let mut policy = ScriptedPolicy {
        rounds: VecDeque::from([vec![(2, Step::Refine(RefinementStep::partial(abc.clone(), [pi("a")])))]]),
    };
    let (refined, stats) = refine_network(&RefinementContext::new(&abstracted), &mut policy).unwrap();
    assert_eq!(refined.layer_ids(2).len(), 2);
    assert!(stats.did_refine);
    assert_eq!(stats.num_steps, 1);
    assert_eq!(stats.num_neurons_refined, vec![1]);
    assert_eq!(stats.neuron_mappings.get(&pi("a")), Some(&abc));
    // the target survived the partial refinement
    assert_eq!(stats.neuron_mappings.get(&abc), Some(&abc));

    let (same, stats) = refine_network(&RefinementContext::new(&refined), &mut policy).unwrap();
    assert!(!stats.did_refine);
    assert_eq!(same, refined);
}

#[test]
fn test_refine_network_regroups_parts() {
    let (abstracted, abc) = abstract_all(&three_inc_network(), "abc");
    let regroup = AbstractionStep::new("bc", [pi("b"), pi("c")]).unwrap();
    let mut policy = ScriptedPolicy {
        rounds: VecDeque::from([vec![
            (2, Step::Refine(RefinementStep::full(abc.clone()))),
            (2, Step::Abstract(regroup.clone())),
        ]]),
    };
    let (refined, stats) = refine_network(&RefinementContext::new(&abstracted), &mut policy).unwrap();
    assert_eq!(refined.layer_ids(2), [pi("a"), regroup.new_name().clone()]);
    assert_eq!(stats.num_steps, 1);
    assert_eq!(stats.num_neurons_refined, vec![3]);
    assert!(!stats.neuron_mappings.contains_key(&abc));
}

/// `y >= 0` on `[0, 2]^2`. The example `(1, 1)` satisfies it only on the
/// abstract network: y = 37.5 there and -36.5 on the concrete one.
fn spurious_setup() -> (Network, Network, BasicProperty, NeuronValues) {
    let network = layered_network();
    let abstracted = abstract_network(&network, &mut CompleteAbstractionLeftToRight::new()).unwrap();
    let property = BasicProperty::new(
        vec![
            BasicConstraint::lower("x0", 0.0),
            BasicConstraint::upper("x0", 2.0),
            BasicConstraint::lower("x1", 0.0),
            BasicConstraint::upper("x1", 2.0),
        ],
        vec![BasicConstraint::lower(NeuronId::new("y").with_scaling(Scaling::Inc), 0.0)],
    );
    let example = NeuronValues::from([(NeuronId::new("x0"), 1.0), (NeuronId::new("x1"), 1.0)]);
    (network, abstracted, property, example)
}

#[test]
fn test_spurious_setup_values() {
    let (network, abstracted, property, example) = spurious_setup();
    let y = NeuronId::new("y").with_scaling(Scaling::Inc);
    assert_eq!(abstracted.evaluate_assignment(&example).unwrap()[&y], 37.5);
    assert_eq!(network.evaluate_assignment(&example).unwrap()[&y], -36.5);
    assert!(is_satisfying_assignment(&abstracted, &example, &property).unwrap().0);
    assert!(!is_satisfying_assignment(&network, &example, &property).unwrap().0);
}

#[test]
fn test_refine_until_not_satisfying_stops_on_first_failure() {
    let (_, abstracted, property, example) = spurious_setup();
    let mut calls = 0usize;
    let mut update = |_: &Network| -> Result<BasicProperty> {
        calls += 1;
        Ok(BasicProperty::new(
            vec![
                BasicConstraint::lower("x0", 0.0),
                BasicConstraint::upper("x0", 2.0),
                BasicConstraint::lower("x1", 0.0),
                BasicConstraint::upper("x1", 2.0),
            ],
            vec![BasicConstraint::lower(NeuronId::new("y").with_scaling(Scaling::Inc), 0.0)],
        ))
    };
    let (refined, stats) = refine_until_not_satisfying(
        &RefinementContext::new(&abstracted),
        &mut RefineByMaxLoss::new(1),
        std::slice::from_ref(&example),
        &property,
        Some(&mut update),
    )
    .unwrap();

    assert!(stats.did_refine);
    assert!(!is_satisfying_assignment(&refined, &example, &property).unwrap().0);
    assert_eq!(calls, stats.num_steps);
    assert_eq!(stats.steps.len(), stats.num_steps);
}

#[test]
fn test_refine_until_not_satisfying_without_anything_to_refine() {
    let (network, _, property, example) = spurious_setup();
    let (same, stats) = refine_until_not_satisfying(
        &RefinementContext::new(&network),
        &mut RefineByMaxLoss::new(2),
        &[example],
        &property,
        None,
    )
    .unwrap();
    assert_eq!(same, network);
    assert_eq!(stats, RefinementStatistics::default());
}

#[test]
fn test_statistics_merge() {
    let mut total = RefinementStatistics::default();
    total.merge(RefinementStatistics {
        did_refine: true,
        num_steps: 2,
        num_neurons_refined: vec![1, 3],
        steps: vec![RefinementStep::full(pi("p")), RefinementStep::full(nd("q"))],
        neuron_mappings: [(pi("a"), pi("p"))].into(),
    });
    total.merge(RefinementStatistics::default());
    assert!(total.did_refine);
    assert_eq!(total.num_steps, 2);
    assert_eq!(total.num_neurons_refined, vec![1, 3]);
    assert_eq!(total.neuron_mappings.len(), 1);
}
