//! Sign and scaling classification of hidden neurons.
//!
//! Abstraction may only merge neurons of the same type, so every hidden
//! layer open to abstraction is split twice:
//! 1. each neuron becomes a `+` copy keeping its non-negative outgoing
//!    weights and a `-` copy keeping its non-positive ones;
//! 2. each copy becomes an `I` copy keeping the edges through which it
//!    increases the output and a `D` copy keeping the others.
//!
//! Copies whose outgoing row is all zeros are dropped. Output neurons are
//! classified `Inc` before the second split.

use arnn_core::{ArnnError, BiasTable, Network, NeuronId, Result, Scaling, Sign, WeightsTable};
use arnn_property::BasicProperty;
use ndarray::{concatenate, Array2, Axis};
use std::sync::Arc;
use tracing::info;

/// Classify every layer in `2..layers_count - 1`.
pub fn preprocess(network: &Network) -> Result<Network> {
    let layers: Vec<usize> = (2..network.layers_count().saturating_sub(1)).collect();
    preprocess_layers(network, &layers)
}

/// Classify the given layers. Layers are split last to first so each split
/// sees the final neurons of the next layer.
pub fn preprocess_layers(network: &Network, layers: &[usize]) -> Result<Network> {
    let split = split_layers(network, layers, split_pos_neg)?;
    let split = with_increasing_outputs(&split)?;
    let split = split_layers(&split, layers, split_inc_dec)?;
    info!(before = %network.info(), after = %split.info(), "preprocessed network");
    Ok(split)
}

/// Output constraints of `property` addressed to the `Inc`-classified output
/// neurons produced by [`preprocess`].
pub fn classify_output_constraints(property: &BasicProperty) -> BasicProperty {
    BasicProperty {
        input_constraints: property.input_constraints.clone(),
        output_constraints: property
            .output_constraints
            .iter()
            .map(|c| c.with_neuron(c.neuron().clone().with_scaling(Scaling::Inc)))
            .collect(),
    }
}

type LayerSplit = fn(&WeightsTable, &WeightsTable, &BiasTable) -> Result<(WeightsTable, WeightsTable, BiasTable)>;

fn split_layers(network: &Network, layers: &[usize], split: LayerSplit) -> Result<Network> {
    let mut current = network.clone();
    for &layer in layers.iter().rev() {
        let (incoming, outgoing, biases) = split(
            &current.weights()[layer - 1],
            &current.weights()[layer],
            &current.biases()[layer],
        )?;
        current = current.with_layer_tables(layer, incoming, outgoing, biases)?;
    }
    Ok(current)
}

fn with_increasing_outputs(network: &Network) -> Result<Network> {
    let (mut weights, mut biases, activations) = network.clone().into_parts();
    let last = weights.len() - 1;
    let outputs: Vec<NeuronId> = network
        .output_ids()
        .iter()
        .map(|id| id.clone().with_scaling(Scaling::Inc))
        .collect();
    weights[last] = Arc::new(WeightsTable::new(
        weights[last].srcs().to_vec(),
        outputs.clone(),
        weights[last].values().clone(),
    )?);
    biases[last + 1] = Arc::new(BiasTable::new(outputs, biases[last + 1].values().to_vec())?);
    Network::from_shared(weights, biases, activations)
}

/// Split every neuron of a layer in two copies. `copy_id(k, id)` names copy
/// `k` of `id` and `keeps_edge(k, src, dest, w)` decides whether copy `k`
/// keeps the outgoing edge.
fn split_layer(
    incoming: &WeightsTable,
    outgoing: &WeightsTable,
    biases: &BiasTable,
    copy_id: impl Fn(usize, &NeuronId) -> NeuronId,
    keeps_edge: impl Fn(usize, &NeuronId, &NeuronId, f64) -> bool,
) -> Result<(WeightsTable, WeightsTable, BiasTable)> {
    let ids = outgoing.srcs();
    let dests = outgoing.dests();
    let mut new_ids = Vec::with_capacity(2 * ids.len());
    let mut rows = Vec::with_capacity(2);
    for k in 0..2 {
        new_ids.extend(ids.iter().map(|id| copy_id(k, id)));
        rows.push(Array2::from_shape_fn(outgoing.values().dim(), |(i, j)| {
            let w = outgoing.values()[[i, j]];
            if keeps_edge(k, &ids[i], &dests[j], w) {
                w
            } else {
                0.0
            }
        }));
    }
    let new_outgoing =
        concatenate(Axis(0), &[rows[0].view(), rows[1].view()]).map_err(|e| ArnnError::structural(e.to_string()))?;
    let new_incoming = concatenate(Axis(1), &[incoming.values().view(), incoming.values().view()])
        .map_err(|e| ArnnError::structural(e.to_string()))?;
    let new_biases: Vec<f64> = biases.values().iter().chain(biases.values().iter()).copied().collect();

    let keep: Vec<usize> = (0..new_ids.len())
        .filter(|&i| new_outgoing.row(i).iter().any(|w| *w != 0.0))
        .collect();
    let kept_ids: Vec<NeuronId> = keep.iter().map(|&i| new_ids[i].clone()).collect();
    Ok((
        WeightsTable::new(
            incoming.srcs().to_vec(),
            kept_ids.clone(),
            new_incoming.select(Axis(1), &keep),
        )?,
        WeightsTable::new(kept_ids.clone(), dests.to_vec(), new_outgoing.select(Axis(0), &keep))?,
        BiasTable::new(kept_ids, keep.iter().map(|&i| new_biases[i]).collect())?,
    ))
}

fn split_pos_neg(
    incoming: &WeightsTable,
    outgoing: &WeightsTable,
    biases: &BiasTable,
) -> Result<(WeightsTable, WeightsTable, BiasTable)> {
    split_layer(
        incoming,
        outgoing,
        biases,
        |k, id| match k {
            0 => id.renamed(format!("{}+", id.name())).with_sign(Sign::Pos),
            _ => id.renamed(format!("{}-", id.name())).with_sign(Sign::Neg),
        },
        |k, _, _, w| if k == 0 { w >= 0.0 } else { w <= 0.0 },
    )
}

/// Whether the edge `src -> dest` increases the output when `src` grows.
fn is_increasing_edge(src: &NeuronId, dest: &NeuronId) -> bool {
    matches!(
        (dest.scaling(), src.sign()),
        (Some(Scaling::Inc), Some(Sign::Pos)) | (Some(Scaling::Dec), Some(Sign::Neg))
    )
}

fn is_decreasing_edge(src: &NeuronId, dest: &NeuronId) -> bool {
    matches!(
        (dest.scaling(), src.sign()),
        (Some(Scaling::Inc), Some(Sign::Neg)) | (Some(Scaling::Dec), Some(Sign::Pos))
    )
}

fn split_inc_dec(
    incoming: &WeightsTable,
    outgoing: &WeightsTable,
    biases: &BiasTable,
) -> Result<(WeightsTable, WeightsTable, BiasTable)> {
    split_layer(
        incoming,
        outgoing,
        biases,
        |k, id| match k {
            0 => id.renamed(format!("{}I", id.name())).with_scaling(Scaling::Inc),
            _ => id.renamed(format!("{}D", id.name())).with_scaling(Scaling::Dec),
        },
        |k, src, dest, _| {
            if k == 0 {
                is_increasing_edge(src, dest)
            } else {
                is_decreasing_edge(src, dest)
            }
        },
    )
}
