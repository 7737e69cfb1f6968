//! Merging groups of same-typed neurons into single abstract neurons.
//!
//! A merge touches the three tables around a hidden layer:
//! - incoming edges (group as destinations) are aggregated per source with
//!   `max` for `Inc` groups and `min` for `Dec` groups;
//! - outgoing edges (group as sources) are summed per destination;
//! - biases follow the incoming rule.
//!
//! Every produced table records the step in its history so refinement can
//! replay the surviving merges from the concrete origin.

use arnn_core::{
    AbstractionStep, Aggregation, ArnnError, BiasTable, Network, Result, TableAxis, WeightsTable,
};
use tracing::{debug, info};

/// Source of abstraction steps for [`abstract_network`].
///
/// The driver hands the strategy the network produced by its previous step;
/// returning `Ok(None)` ends the abstraction.
pub trait AbstractionStrategy {
    fn next(&mut self, network: &Network) -> Result<Option<(usize, AbstractionStep)>>;
}

pub fn abstract_weights_as_incoming(incoming: &WeightsTable, step: &AbstractionStep) -> Result<WeightsTable> {
    incoming.merge_columns(step, Aggregation::for_scaling(step.scaling()))
}

pub fn abstract_weights_as_outgoing(outgoing: &WeightsTable, step: &AbstractionStep) -> Result<WeightsTable> {
    outgoing.merge_rows(step, Aggregation::Sum)
}

pub fn abstract_biases(biases: &BiasTable, step: &AbstractionStep) -> Result<BiasTable> {
    biases.merge(step, Aggregation::for_scaling(step.scaling()))
}

/// Re-apply a table history entry the same way the original merge did.
pub(crate) fn apply_history_entry(
    table: &WeightsTable,
    axis: TableAxis,
    step: &AbstractionStep,
) -> Result<WeightsTable> {
    match axis {
        TableAxis::Columns => abstract_weights_as_incoming(table, step),
        TableAxis::Rows => abstract_weights_as_outgoing(table, step),
    }
}

/// Merge `step.nodes()` in the tables around one layer.
///
/// Fails with [`ArnnError::UnclassifiedNeuron`] if any grouped neuron lacks
/// a sign or a scaling.
pub fn abstract_layer(
    incoming: &WeightsTable,
    outgoing: &WeightsTable,
    biases: &BiasTable,
    step: &AbstractionStep,
) -> Result<(WeightsTable, WeightsTable, BiasTable)> {
    if let Some(node) = step.nodes().iter().find(|n| !n.is_classified()) {
        return Err(ArnnError::UnclassifiedNeuron(format!(
            "{node:?} has no sign/scaling, was the network preprocessed?"
        )));
    }
    Ok((
        abstract_weights_as_incoming(incoming, step)?,
        abstract_weights_as_outgoing(outgoing, step)?,
        abstract_biases(biases, step)?,
    ))
}

/// Layers open to abstraction and refinement: `1 < index < layers_count - 1`.
pub fn check_layer_index(network: &Network, index: usize) -> Result<()> {
    let layers = network.layers_count();
    if index <= 1 || index + 1 >= layers {
        return Err(ArnnError::InvalidLayerIndex { index, layers });
    }
    Ok(())
}

/// Apply one abstraction step to layer `index` of `network`.
pub fn apply_abstraction(network: &Network, index: usize, step: &AbstractionStep) -> Result<Network> {
    check_layer_index(network, index)?;
    let (incoming, outgoing, biases) = abstract_layer(
        &network.weights()[index - 1],
        &network.weights()[index],
        &network.biases()[index],
        step,
    )?;
    network.with_layer_tables(index, incoming, outgoing, biases)
}

/// Abstract `network` with the steps produced by `strategy`, until it is
/// exhausted.
pub fn abstract_network<S: AbstractionStrategy + ?Sized>(network: &Network, strategy: &mut S) -> Result<Network> {
    let mut current = network.clone();
    let mut steps = 0usize;
    while let Some((index, step)) = strategy.next(&current)? {
        debug!(layer = index, new_name = %step.new_name(), nodes = step.nodes().len(), "abstraction step");
        current = apply_abstraction(&current, index, &step)?;
        steps += 1;
    }
    let before = network.info();
    let after = current.info();
    info!(
        steps,
        hidden_before = before.hidden_nodes,
        hidden_after = after.hidden_nodes,
        "abstraction finished"
    );
    Ok(current)
}
