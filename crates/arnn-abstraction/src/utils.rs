//! Helpers shared by refinement policies.

use crate::refine::{RefinementStep, Step};
use arnn_core::{AbstractionStep, ArnnError, Network, NeuronId, Result, Scaling, Sign};
use std::collections::{BTreeMap, BTreeSet};

/// Abstract neurons of the layers open to refinement, with their layer.
pub fn network_abstracted_neurons(network: &Network) -> Vec<(usize, NeuronId)> {
    (2..network.layers_count().saturating_sub(1))
        .flat_map(|layer| {
            network
                .layer_ids(layer)
                .iter()
                .filter(|id| id.is_abstract())
                .map(move |id| (layer, id.clone()))
        })
        .collect()
}

/// Every original neuron still hidden in an abstract neuron, mapped to that
/// neuron and its layer.
pub fn original_to_abstract_mapping(network: &Network) -> BTreeMap<NeuronId, (usize, NeuronId)> {
    let mut mapping = BTreeMap::new();
    for (layer, abstract_neuron) in network_abstracted_neurons(network) {
        for original in abstract_neuron.original_neurons() {
            mapping.insert(original.clone(), (layer, abstract_neuron.clone()));
        }
    }
    mapping
}

fn lookup<'a>(
    mapping: &'a BTreeMap<NeuronId, (usize, NeuronId)>,
    original: &NeuronId,
) -> Result<&'a (usize, NeuronId)> {
    mapping.get(original).ok_or_else(|| {
        ArnnError::InvalidRefinementStep(format!("{original:?} is not part of any abstract neuron"))
    })
}

/// One partial refinement step per abstract neuron, splitting out the given
/// originals.
pub fn refinement_steps_from_original_nodes<'a>(
    originals: impl IntoIterator<Item = &'a NeuronId>,
    network: &Network,
) -> Result<Vec<(usize, Step)>> {
    let mapping = original_to_abstract_mapping(network);
    let mut parts: BTreeMap<(usize, NeuronId), BTreeSet<NeuronId>> = BTreeMap::new();
    for original in originals {
        let key = lookup(&mapping, original)?;
        parts.entry(key.clone()).or_default().insert(original.clone());
    }
    Ok(parts
        .into_iter()
        .map(|((layer, target), parts)| (layer, Step::Refine(RefinementStep::partial(target, parts))))
        .collect())
}

/// Auto-generated names `ag{layer}:{n}` for regrouped neurons, counting from 1.
#[derive(Debug, Clone)]
pub struct NeuronIdGenerator {
    layer: usize,
    next: usize,
}

impl NeuronIdGenerator {
    pub fn new(layer: usize) -> Self {
        Self { layer, next: 1 }
    }

    pub fn generate(&mut self, sign: Sign, scaling: Scaling) -> NeuronId {
        let name = format!("ag{}:{}", self.layer, self.next);
        self.next += 1;
        NeuronId::classified(name, sign, scaling)
    }
}

/// Split the originals of each group out of their abstract neuron, then
/// merge every group of two or more back into a new abstract neuron.
///
/// Groups named `None` get a generated name from `generators`. Every group
/// must be non-empty and sit inside a single abstract neuron, and no
/// original may appear in two groups.
pub fn grouped_refinement_steps_from_original_nodes(
    groups: &[(Option<String>, Vec<NeuronId>)],
    network: &Network,
    generators: &mut BTreeMap<usize, NeuronIdGenerator>,
) -> Result<Vec<(usize, Step)>> {
    let mapping = original_to_abstract_mapping(network);

    let mut seen = BTreeSet::new();
    for original in groups.iter().flat_map(|(_, group)| group) {
        if !seen.insert(original) {
            return Err(ArnnError::InvalidRefinementStep(format!(
                "{original:?} appears in more than one group"
            )));
        }
    }

    let mut by_abstract: BTreeMap<(usize, NeuronId), Vec<(Option<&str>, &[NeuronId])>> = BTreeMap::new();
    for (name, group) in groups {
        let first = group
            .first()
            .ok_or_else(|| ArnnError::InvalidRefinementStep("empty refinement group".to_string()))?;
        let key = lookup(&mapping, first)?;
        for original in &group[1..] {
            if lookup(&mapping, original)? != key {
                return Err(ArnnError::InvalidRefinementStep(format!(
                    "{first:?} and {original:?} belong to different abstract neurons"
                )));
            }
        }
        by_abstract
            .entry(key.clone())
            .or_default()
            .push((name.as_deref(), group.as_slice()));
    }

    let mut steps = Vec::new();
    for ((layer, target), groups) in by_abstract {
        let parts = groups.iter().flat_map(|(_, group)| group.iter().cloned());
        steps.push((layer, Step::Refine(RefinementStep::partial(target, parts))));
        for (name, group) in groups {
            if group.len() < 2 {
                continue;
            }
            let step = match name {
                Some(name) => AbstractionStep::new(name, group.iter().cloned())?,
                None => {
                    let (sign, scaling) = group[0].neuron_type().ok_or_else(|| {
                        ArnnError::UnclassifiedNeuron(format!("{:?} cannot be regrouped", group[0]))
                    })?;
                    let generated = generators
                        .entry(layer)
                        .or_insert_with(|| NeuronIdGenerator::new(layer))
                        .generate(sign, scaling);
                    AbstractionStep::with_id(&generated, group.iter().cloned())?
                }
            };
            steps.push((layer, Step::Abstract(step)));
        }
    }
    Ok(steps)
}
