//! Conjunctions of linear inequalities over output neurons.

use crate::{BasicConstraint, BasicProperty};
use arnn_core::{ActivationFunction, ArnnError, BiasTable, Network, NeuronId, Result, WeightsTable};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub neuron: NeuronId,
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_factor() -> f64 {
    1.0
}

impl Term {
    pub fn new(neuron: impl Into<NeuronId>, factor: f64) -> Self {
        Self {
            neuron: neuron.into(),
            factor,
        }
    }
}

impl From<NeuronId> for Term {
    fn from(neuron: NeuronId) -> Self {
        Self { neuron, factor: 1.0 }
    }
}

/// `sum(terms) >= value` or `sum(terms) <= value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MultiVarConstraint {
    MultiVarLowerBound { terms: Vec<Term>, value: f64 },
    MultiVarUpperBound { terms: Vec<Term>, value: f64 },
}

impl MultiVarConstraint {
    pub fn lower(terms: Vec<Term>, value: f64) -> Self {
        MultiVarConstraint::MultiVarLowerBound { terms, value }
    }

    pub fn upper(terms: Vec<Term>, value: f64) -> Self {
        MultiVarConstraint::MultiVarUpperBound { terms, value }
    }

    pub fn terms(&self) -> &[Term] {
        match self {
            MultiVarConstraint::MultiVarLowerBound { terms, .. }
            | MultiVarConstraint::MultiVarUpperBound { terms, .. } => terms,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            MultiVarConstraint::MultiVarLowerBound { value, .. }
            | MultiVarConstraint::MultiVarUpperBound { value, .. } => *value,
        }
    }

    pub fn is_lower(&self) -> bool {
        matches!(self, MultiVarConstraint::MultiVarLowerBound { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConjunctionProperty {
    pub input_constraints: Vec<BasicConstraint>,
    pub output_constraints: Vec<MultiVarConstraint>,
}

/// Append one identity layer with a neuron `c{i}` per inequality computing
/// `sum(terms) - value`, and bound each new neuron at 0 in the direction of
/// its inequality.
///
/// Fails with [`ArnnError::MixedRelationalOperator`] before touching the
/// network when the inequalities do not all share one direction.
pub fn prepare_network_conjunction(
    network: &Network,
    property: &ConjunctionProperty,
) -> Result<(Network, BasicProperty)> {
    let Some(first) = property.output_constraints.first() else {
        return Err(ArnnError::InvalidProperty(
            "a conjunction property needs at least one output constraint".to_string(),
        ));
    };
    let lower = first.is_lower();
    if property.output_constraints.iter().any(|c| c.is_lower() != lower) {
        return Err(ArnnError::MixedRelationalOperator);
    }

    let outputs = network.output_ids();
    let count = property.output_constraints.len();
    let new_ids: Vec<NeuronId> = (1..=count).map(|i| NeuronId::new(format!("c{i}"))).collect();

    let mut weights = Array2::zeros((outputs.len(), count));
    let mut biases = Vec::with_capacity(count);
    for (j, constraint) in property.output_constraints.iter().enumerate() {
        for term in constraint.terms() {
            let i = outputs
                .iter()
                .position(|o| *o == term.neuron)
                .ok_or_else(|| ArnnError::UnknownNeuron(format!("output {:?}", term.neuron)))?;
            weights[[i, j]] += term.factor;
        }
        biases.push(-constraint.value());
    }

    let new_constraints = new_ids
        .iter()
        .map(|id| {
            if lower {
                BasicConstraint::lower(id.clone(), 0.0)
            } else {
                BasicConstraint::upper(id.clone(), 0.0)
            }
        })
        .collect();

    let (mut all_weights, mut all_biases, mut activations) = network.clone().into_parts();
    all_weights.push(Arc::new(WeightsTable::new(outputs.to_vec(), new_ids.clone(), weights)?));
    all_biases.push(Arc::new(BiasTable::new(new_ids, biases)?));
    activations.push(ActivationFunction::Id);
    let new_network = Network::from_shared(all_weights, all_biases, activations)?;

    Ok((
        new_network,
        BasicProperty::new(property.input_constraints.clone(), new_constraints),
    ))
}
