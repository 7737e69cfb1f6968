//! Abstraction steps: the unit of history recorded on every table.

use crate::{ArnnError, NeuronId, Result, Scaling, Sign};
use std::collections::BTreeSet;

/// Merge of two or more same-typed neurons into one abstract neuron.
///
/// The synthesized `new_name` is an abstract [`NeuronId`] whose provenance is
/// the flattened union of the merged neurons' provenance and whose type is
/// the shared type of the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractionStep {
    new_name: NeuronId,
    nodes: BTreeSet<NeuronId>,
}

impl AbstractionStep {
    /// Create a step whose new neuron takes its type from the grouped nodes.
    pub fn new(new_name: &str, nodes: impl IntoIterator<Item = NeuronId>) -> Result<Self> {
        let nodes: BTreeSet<NeuronId> = nodes.into_iter().collect();
        let (sign, scaling) = shared_type(&nodes)?;
        Ok(Self::build(new_name, sign, scaling, nodes))
    }

    /// Create a step with an explicit identifier for the new neuron. Its type
    /// must match the type of the grouped nodes.
    pub fn with_id(new_name: &NeuronId, nodes: impl IntoIterator<Item = NeuronId>) -> Result<Self> {
        let nodes: BTreeSet<NeuronId> = nodes.into_iter().collect();
        let (sign, scaling) = shared_type(&nodes)?;
        if (new_name.sign(), new_name.scaling()) != (sign, scaling) {
            return Err(ArnnError::InvalidAbstractionStep(format!(
                "new name {:?} has a different type than its nodes ({:?}, {:?})",
                new_name, sign, scaling
            )));
        }
        Ok(Self::build(new_name.name(), sign, scaling, nodes))
    }

    fn build(
        name: &str,
        sign: Option<Sign>,
        scaling: Option<Scaling>,
        nodes: BTreeSet<NeuronId>,
    ) -> Self {
        let originals = nodes.iter().flat_map(NeuronId::flattened).collect();
        Self {
            new_name: NeuronId::abstracted(name, sign, scaling, originals),
            nodes,
        }
    }

    pub fn new_name(&self) -> &NeuronId {
        &self.new_name
    }

    pub fn nodes(&self) -> &BTreeSet<NeuronId> {
        &self.nodes
    }

    /// Shared scaling of the group (`None` for unclassified groups).
    pub fn scaling(&self) -> Option<Scaling> {
        self.new_name.scaling()
    }

    pub fn sign(&self) -> Option<Sign> {
        self.new_name.sign()
    }
}

fn shared_type(nodes: &BTreeSet<NeuronId>) -> Result<(Option<Sign>, Option<Scaling>)> {
    if nodes.len() < 2 {
        return Err(ArnnError::InvalidAbstractionStep(format!(
            "a step must group at least 2 nodes, got {}",
            nodes.len()
        )));
    }
    let mut iter = nodes.iter();
    // at least 2 nodes, checked above
    let first = iter.next().map(|n| (n.sign(), n.scaling())).unwrap_or_default();
    for node in iter {
        if (node.sign(), node.scaling()) != first {
            return Err(ArnnError::InvalidAbstractionStep(format!(
                "grouped nodes have mixed types: {:?} vs ({:?}, {:?})",
                node, first.0, first.1
            )));
        }
    }
    Ok(first)
}
