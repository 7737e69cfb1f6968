//! Ready-made abstraction strategies.

use crate::AbstractionStrategy;
use arnn_core::{AbstractionStep, ArnnError, Network, NeuronId, NeuronType, Result, Scaling, Sign};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

type PlannedStep = (usize, AbstractionStep);

/// Group name of the `(sign, scaling)` group of a layer, e.g. `a2+I`.
pub fn group_name(layer: usize, (sign, scaling): NeuronType) -> String {
    let sign = match sign {
        Sign::Pos => '+',
        Sign::Neg => '-',
    };
    let scaling = match scaling {
        Scaling::Inc => 'I',
        Scaling::Dec => 'D',
    };
    format!("a{layer}{sign}{scaling}")
}

/// One step per `(sign, scaling)` group of every layer in `layers`, merging
/// the whole group. Groups of a single neuron are skipped.
pub fn simple_steps(network: &Network, layers: impl IntoIterator<Item = usize>) -> Result<Vec<PlannedStep>> {
    let mut steps = Vec::new();
    for layer in layers {
        let mut groups: BTreeMap<NeuronType, BTreeSet<NeuronId>> = BTreeMap::new();
        for id in network.layer_ids(layer) {
            let neuron_type = id
                .neuron_type()
                .ok_or_else(|| ArnnError::UnclassifiedNeuron(format!("{id:?} in layer {layer}")))?;
            groups.entry(neuron_type).or_default().insert(id.clone());
        }
        for (neuron_type, group) in groups {
            if group.len() < 2 {
                continue;
            }
            steps.push((layer, AbstractionStep::new(&group_name(layer, neuron_type), group)?));
        }
    }
    Ok(steps)
}

fn abstractable_layers(network: &Network) -> std::ops::Range<usize> {
    2..network.layers_count().saturating_sub(1)
}

/// Plan on the first call, then hand out the planned steps in order.
fn next_planned(
    plan: &mut Option<VecDeque<PlannedStep>>,
    make_plan: impl FnOnce() -> Result<Vec<PlannedStep>>,
) -> Result<Option<PlannedStep>> {
    if plan.is_none() {
        *plan = Some(make_plan()?.into());
    }
    Ok(plan.as_mut().and_then(VecDeque::pop_front))
}

/// Merge every type group of every hidden layer, first layer first.
#[derive(Debug, Default)]
pub struct CompleteAbstractionLeftToRight {
    plan: Option<VecDeque<PlannedStep>>,
}

impl CompleteAbstractionLeftToRight {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AbstractionStrategy for CompleteAbstractionLeftToRight {
    fn next(&mut self, network: &Network) -> Result<Option<(usize, AbstractionStep)>> {
        next_planned(&mut self.plan, || simple_steps(network, abstractable_layers(network)))
    }
}

/// Merge every type group of every hidden layer, last layer first.
#[derive(Debug, Default)]
pub struct CompleteAbstractionRightToLeft {
    plan: Option<VecDeque<PlannedStep>>,
}

impl CompleteAbstractionRightToLeft {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AbstractionStrategy for CompleteAbstractionRightToLeft {
    fn next(&mut self, network: &Network) -> Result<Option<(usize, AbstractionStep)>> {
        next_planned(&mut self.plan, || simple_steps(network, abstractable_layers(network).rev()))
    }
}

/// Split every type group into random chunks of at least two neurons and
/// merge the chunks in a random order.
///
/// Chunks are named `{group}:{i}`. Runs with the same seed produce the same
/// steps.
#[derive(Debug)]
pub struct RandomAbstraction {
    rng: StdRng,
    plan: Option<VecDeque<PlannedStep>>,
}

impl RandomAbstraction {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            plan: None,
        }
    }

    fn make_plan(&mut self, network: &Network) -> Result<Vec<PlannedStep>> {
        let mut steps = Vec::new();
        for (layer, step) in simple_steps(network, abstractable_layers(network))? {
            let nodes: Vec<NeuronId> = step.nodes().iter().cloned().collect();
            for (i, chunk) in chunk_bounds(&mut self.rng, nodes.len()).windows(2).enumerate() {
                let name = format!("{}:{i}", step.new_name().name());
                steps.push((layer, AbstractionStep::new(&name, nodes[chunk[0]..chunk[1]].iter().cloned())?));
            }
        }
        steps.shuffle(&mut self.rng);
        Ok(steps)
    }
}

/// Random cut points `0 = c0 < c1 < ... = len` with every chunk of length 2
/// or more. `len` must be at least 2.
fn chunk_bounds<R: Rng>(rng: &mut R, len: usize) -> Vec<usize> {
    let mut bounds = vec![0];
    let mut last = 0;
    while last < len {
        let mut end = rng.random_range((last + 2).min(len)..=len);
        // a single neuron cannot form a chunk
        if end + 1 == len {
            end = len;
        }
        bounds.push(end);
        last = end;
    }
    bounds
}

impl AbstractionStrategy for RandomAbstraction {
    fn next(&mut self, network: &Network) -> Result<Option<(usize, AbstractionStep)>> {
        if self.plan.is_none() {
            let plan = self.make_plan(network)?;
            self.plan = Some(plan.into());
        }
        Ok(self.plan.as_mut().and_then(VecDeque::pop_front))
    }
}

/// Apply a fixed list of steps. The layer of each step is the layer of its
/// first node in the current network.
#[derive(Debug)]
pub struct ExplicitSteps {
    steps: VecDeque<AbstractionStep>,
}

impl ExplicitSteps {
    pub fn new(steps: impl IntoIterator<Item = AbstractionStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }
}

impl AbstractionStrategy for ExplicitSteps {
    fn next(&mut self, network: &Network) -> Result<Option<(usize, AbstractionStep)>> {
        let Some(step) = self.steps.pop_front() else {
            return Ok(None);
        };
        let first = step
            .nodes()
            .first()
            .ok_or_else(|| ArnnError::InvalidAbstractionStep("step without nodes".to_string()))?;
        let (layer, _) = network
            .find(first)
            .ok_or_else(|| ArnnError::UnknownNeuron(format!("{first:?} is not in the network")))?;
        Ok(Some((layer, step)))
    }
}
