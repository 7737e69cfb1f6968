//! Selective undoing of abstraction.
//!
//! Aggregates cannot be inverted, so refinement rebuilds the three tables of
//! a layer from their concrete origin: the history of each table is filtered
//! so merges involving the refined neurons shrink or disappear, and the
//! remaining merges are replayed in order.

use crate::abstraction::{abstract_layer, apply_history_entry, check_layer_index};
use crate::policies::{RefinementContext, RefinementPolicy};
use arnn_core::{
    AbstractionStep, ArnnError, BiasTable, HistoryEntry, Network, NeuronId, NeuronValues, Result, TableAxis,
    WeightsTable,
};
use arnn_property::{is_satisfying_assignment, BasicProperty};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Split `parts` out of the abstract neuron `target_neuron`. `parts: None`
/// splits out its whole provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefinementStep {
    pub target_neuron: NeuronId,
    pub parts: Option<BTreeSet<NeuronId>>,
}

impl RefinementStep {
    pub fn full(target_neuron: NeuronId) -> Self {
        Self {
            target_neuron,
            parts: None,
        }
    }

    pub fn partial(target_neuron: NeuronId, parts: impl IntoIterator<Item = NeuronId>) -> Self {
        Self {
            target_neuron,
            parts: Some(parts.into_iter().collect()),
        }
    }
}

/// An operation produced by a refinement policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Refine(RefinementStep),
    Abstract(AbstractionStep),
}

/// What a refinement pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefinementStatistics {
    pub did_refine: bool,
    /// Number of refinement steps applied. Abstraction steps are not counted.
    pub num_steps: usize,
    /// Neurons split out by each refinement step.
    pub num_neurons_refined: Vec<usize>,
    pub steps: Vec<RefinementStep>,
    /// Each split-out neuron to the abstract neuron it was part of.
    pub neuron_mappings: BTreeMap<NeuronId, NeuronId>,
}

impl RefinementStatistics {
    /// Fold the statistics of a later pass into these.
    pub fn merge(&mut self, other: RefinementStatistics) {
        self.did_refine |= other.did_refine;
        self.num_steps += other.num_steps;
        self.num_neurons_refined.extend(other.num_neurons_refined);
        self.steps.extend(other.steps);
        self.neuron_mappings.extend(other.neuron_mappings);
    }

    fn record(&mut self, step: &RefinementStep, target: &NeuronId, new_ids: &BTreeSet<NeuronId>, still_present: bool) {
        self.did_refine = true;
        self.num_steps += 1;
        self.num_neurons_refined.push(new_ids.len());
        self.steps.push(step.clone());
        for part in new_ids {
            self.neuron_mappings.insert(part.clone(), target.clone());
        }
        if step.parts.is_some() && still_present {
            self.neuron_mappings.insert(target.clone(), target.clone());
        }
    }
}

/// Drop `new_ids` from every `axis` merge of `history`.
///
/// A merge left with one survivor is dropped and its abstract neuron is
/// replaced by the survivor in later merges; a merge left with none is
/// dropped together with its abstract neuron. Merges on the other axis are
/// kept as they are.
fn filter_history(
    history: &[HistoryEntry],
    axis: TableAxis,
    new_ids: &BTreeSet<NeuronId>,
) -> Result<Vec<HistoryEntry>> {
    let mut replaced: HashMap<NeuronId, Option<NeuronId>> = HashMap::new();
    let mut filtered = Vec::with_capacity(history.len());
    for (entry_axis, step) in history {
        if *entry_axis != axis {
            filtered.push((*entry_axis, step.clone()));
            continue;
        }
        let survivors: BTreeSet<NeuronId> = step
            .nodes()
            .iter()
            .filter(|node| !new_ids.contains(*node))
            .filter_map(|node| match replaced.get(node) {
                Some(replacement) => replacement.clone(),
                None => Some(node.clone()),
            })
            .collect();
        let name = step.new_name().clone();
        match survivors.len() {
            0 => {
                replaced.insert(name, None);
            }
            1 => {
                replaced.insert(name, survivors.into_iter().next());
            }
            _ => {
                let rebuilt = AbstractionStep::with_id(step.new_name(), survivors)?;
                replaced.insert(name, Some(rebuilt.new_name().clone()));
                filtered.push((axis, rebuilt));
            }
        }
    }
    Ok(filtered)
}

fn replay(table: &WeightsTable, history: &[HistoryEntry]) -> Result<WeightsTable> {
    let mut current = table.concrete_origin();
    for (axis, step) in history {
        current = apply_history_entry(&current, *axis, step)?;
    }
    Ok(current)
}

/// The neurons a refinement step splits out, checked against the stored
/// target.
fn split_out_ids(target: &NeuronId, step: &RefinementStep) -> Result<BTreeSet<NeuronId>> {
    if !target.is_abstract() {
        return Err(ArnnError::InvalidRefinementStep(format!(
            "{target:?} is not an abstract neuron"
        )));
    }
    match &step.parts {
        None => Ok(target.original_neurons().clone()),
        Some(parts) if parts.is_empty() => Err(ArnnError::InvalidRefinementStep(format!(
            "no parts to split out of {target:?}"
        ))),
        Some(parts) => {
            if let Some(stray) = parts.iter().find(|p| !target.original_neurons().contains(*p)) {
                return Err(ArnnError::InvalidRefinementStep(format!(
                    "{stray:?} is not part of {target:?}"
                )));
            }
            Ok(parts.clone())
        }
    }
}

/// Split the neurons named by `step` out of its target abstract neuron.
///
/// Full refinement is the exact inverse of [`abstract_layer`]: every table
/// comes back with its pre-merge values.
pub fn refine_layer(
    incoming: &WeightsTable,
    outgoing: &WeightsTable,
    biases: &BiasTable,
    step: &RefinementStep,
) -> Result<(WeightsTable, WeightsTable, BiasTable)> {
    let target = outgoing.src_id(&step.target_neuron).ok_or_else(|| {
        ArnnError::InvalidRefinementStep(format!("{:?} is not in the layer", step.target_neuron))
    })?;
    let new_ids = split_out_ids(target, step)?;

    let incoming_history = filter_history(incoming.history(), TableAxis::Columns, &new_ids)?;
    let outgoing_history = filter_history(outgoing.history(), TableAxis::Rows, &new_ids)?;
    let biases_history = filter_history(biases.as_table().history(), TableAxis::Columns, &new_ids)?;

    Ok((
        replay(incoming, &incoming_history)?,
        replay(outgoing, &outgoing_history)?,
        BiasTable::from_table(replay(biases.as_table(), &biases_history)?)?,
    ))
}

/// Apply one refinement step to layer `index` of `network`.
pub fn apply_refinement(network: &Network, index: usize, step: &RefinementStep) -> Result<Network> {
    check_layer_index(network, index)?;
    let (incoming, outgoing, biases) = refine_layer(
        &network.weights()[index - 1],
        &network.weights()[index],
        &network.biases()[index],
        step,
    )?;
    network.with_layer_tables(index, incoming, outgoing, biases)
}

/// Apply one policy step, recording refinement steps in `stats`.
fn apply_step(network: &Network, index: usize, step: &Step, stats: &mut RefinementStatistics) -> Result<Network> {
    check_layer_index(network, index)?;
    let incoming = &network.weights()[index - 1];
    let outgoing = &network.weights()[index];
    let biases = &network.biases()[index];
    match step {
        Step::Refine(refinement) => {
            debug!(layer = index, target = %refinement.target_neuron, parts = ?refinement.parts, "refinement step");
            let target = outgoing
                .src_id(&refinement.target_neuron)
                .cloned()
                .ok_or_else(|| {
                    ArnnError::InvalidRefinementStep(format!("{:?} is not in the layer", refinement.target_neuron))
                })?;
            let new_ids = split_out_ids(&target, refinement)?;
            let (incoming, outgoing, biases) = refine_layer(incoming, outgoing, biases, refinement)?;
            let still_present = outgoing.src_index(&target).is_some();
            let refined = network.with_layer_tables(index, incoming, outgoing, biases)?;
            stats.record(refinement, &target, &new_ids, still_present);
            Ok(refined)
        }
        Step::Abstract(abstraction) => {
            debug!(layer = index, new_name = %abstraction.new_name(), nodes = abstraction.nodes().len(), "abstraction step");
            let (incoming, outgoing, biases) = abstract_layer(incoming, outgoing, biases, abstraction)?;
            network.with_layer_tables(index, incoming, outgoing, biases)
        }
    }
}

/// Apply every step `policy` produces for `context`.
pub fn refine_network<P: RefinementPolicy + ?Sized>(
    context: &RefinementContext<'_>,
    policy: &mut P,
) -> Result<(Network, RefinementStatistics)> {
    let steps = policy.steps(context)?;
    let mut stats = RefinementStatistics::default();
    let mut network = context.network.clone();
    for (index, step) in &steps {
        network = apply_step(&network, *index, step, &mut stats)?;
    }
    info!(
        refinement_steps = stats.num_steps,
        neurons = stats.num_neurons_refined.iter().sum::<usize>(),
        hidden_nodes = network.info().hidden_nodes,
        "refined network"
    );
    Ok((network, stats))
}

/// Refine until one of `spurious_examples` no longer satisfies `property`.
///
/// The examples are re-checked after every single step, not only after a
/// full policy round. With `update_property`, the property is recomputed
/// for each intermediate network before checking. Stops early when the
/// policy has nothing left to refine.
pub fn refine_until_not_satisfying<P: RefinementPolicy + ?Sized>(
    context: &RefinementContext<'_>,
    policy: &mut P,
    spurious_examples: &[NeuronValues],
    property: &BasicProperty,
    mut update_property: Option<&mut dyn FnMut(&Network) -> Result<BasicProperty>>,
) -> Result<(Network, RefinementStatistics)> {
    let mut network = context.network.clone();
    let mut stats = RefinementStatistics::default();
    let mut property = property.clone();
    let mut rounds = 0usize;
    loop {
        let round_context = context.with_network(&network);
        let steps = policy.steps(&round_context)?;
        if steps.is_empty() {
            info!(rounds, refinement_steps = stats.num_steps, "nothing left to refine");
            return Ok((network, stats));
        }
        rounds += 1;
        for (index, step) in &steps {
            network = apply_step(&network, *index, step, &mut stats)?;
            if let Some(update) = update_property.as_deref_mut() {
                property = update(&network)?;
            }
            for example in spurious_examples {
                let (satisfying, reasons) = is_satisfying_assignment(&network, example, &property)?;
                if !satisfying {
                    info!(
                        rounds,
                        refinement_steps = stats.num_steps,
                        hidden_nodes = network.info().hidden_nodes,
                        ?reasons,
                        "spurious example eliminated"
                    );
                    return Ok((network, stats));
                }
            }
        }
    }
}
