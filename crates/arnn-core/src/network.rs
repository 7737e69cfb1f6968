//! Layered feed-forward network over labelled weight tables.

use crate::{ArnnError, BiasTable, NeuronId, Result, WeightsTable};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Values keyed by neuron.
pub type NeuronValues = BTreeMap<NeuronId, f64>;

/// Per-layer activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationFunction {
    Relu,
    Id,
}

impl ActivationFunction {
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            ActivationFunction::Relu => x.max(0.0),
            ActivationFunction::Id => x,
        }
    }

    pub fn apply_inplace(self, values: &mut Array2<f64>) {
        if self == ActivationFunction::Relu {
            values.mapv_inplace(|v| v.max(0.0));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerType {
    Input,
    Hidden,
    Output,
}

/// Borrowed view of one layer.
#[derive(Debug, Clone, Copy)]
pub struct Layer<'a> {
    pub layer_type: LayerType,
    pub nodes: &'a [NeuronId],
    pub activation: ActivationFunction,
}

/// Layer sizes of a network, used in logs and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub layers: Vec<usize>,
    pub hidden_nodes: usize,
}

impl fmt::Display for NetworkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layers={:?} hidden_nodes={}", self.layers, self.hidden_nodes)
    }
}

/// A network of `L` layers: `L - 1` weight tables, `L` bias tables and `L`
/// activations.
///
/// Tables are shared behind [`Arc`]. Abstraction and refinement build a new
/// network that reuses every untouched table of the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    weights: Vec<Arc<WeightsTable>>,
    biases: Vec<Arc<BiasTable>>,
    activations: Vec<ActivationFunction>,
}

impl Network {
    pub fn new(
        weights: Vec<WeightsTable>,
        biases: Vec<BiasTable>,
        activations: Vec<ActivationFunction>,
    ) -> Result<Self> {
        Self::from_shared(
            weights.into_iter().map(Arc::new).collect(),
            biases.into_iter().map(Arc::new).collect(),
            activations,
        )
    }

    pub fn from_shared(
        weights: Vec<Arc<WeightsTable>>,
        biases: Vec<Arc<BiasTable>>,
        activations: Vec<ActivationFunction>,
    ) -> Result<Self> {
        let network = Self {
            weights,
            biases,
            activations,
        };
        network.verify()?;
        Ok(network)
    }

    pub fn into_parts(
        self,
    ) -> (
        Vec<Arc<WeightsTable>>,
        Vec<Arc<BiasTable>>,
        Vec<ActivationFunction>,
    ) {
        (self.weights, self.biases, self.activations)
    }

    /// Check table counts and layer adjacency.
    pub fn verify(&self) -> Result<()> {
        if self.biases.len() < 2 {
            return Err(ArnnError::structural(format!(
                "a network needs at least 2 layers, got {}",
                self.biases.len()
            )));
        }
        if self.weights.len() + 1 != self.biases.len() || self.activations.len() != self.biases.len() {
            return Err(ArnnError::structural(format!(
                "{} weight tables, {} bias tables and {} activations do not describe one network",
                self.weights.len(),
                self.biases.len(),
                self.activations.len()
            )));
        }
        for (i, w) in self.weights.iter().enumerate() {
            if w.srcs() != self.biases[i].ids() {
                return Err(ArnnError::structural(format!(
                    "weights[{i}] sources do not match the neurons of layer {i}"
                )));
            }
            if w.dests() != self.biases[i + 1].ids() {
                return Err(ArnnError::structural(format!(
                    "weights[{i}] destinations do not match the neurons of layer {}",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    pub fn weights(&self) -> &[Arc<WeightsTable>] {
        &self.weights
    }

    pub fn biases(&self) -> &[Arc<BiasTable>] {
        &self.biases
    }

    pub fn activations(&self) -> &[ActivationFunction] {
        &self.activations
    }

    pub fn layers_count(&self) -> usize {
        self.weights.len() + 1
    }

    /// Neurons of layer `idx`.
    pub fn layer_ids(&self, idx: usize) -> &[NeuronId] {
        self.biases[idx].ids()
    }

    pub fn layers(&self) -> Vec<Layer<'_>> {
        let last = self.layers_count() - 1;
        (0..=last)
            .map(|idx| Layer {
                layer_type: match idx {
                    0 => LayerType::Input,
                    i if i == last => LayerType::Output,
                    _ => LayerType::Hidden,
                },
                nodes: self.layer_ids(idx),
                activation: self.activations[idx],
            })
            .collect()
    }

    pub fn input_ids(&self) -> &[NeuronId] {
        self.weights[0].srcs()
    }

    pub fn output_ids(&self) -> &[NeuronId] {
        self.weights[self.weights.len() - 1].dests()
    }

    pub fn hidden_ids(&self) -> impl Iterator<Item = &NeuronId> {
        (1..self.layers_count() - 1).flat_map(move |idx| self.layer_ids(idx).iter())
    }

    pub fn neuron_ids(&self) -> impl Iterator<Item = &NeuronId> {
        (0..self.layers_count()).flat_map(move |idx| self.layer_ids(idx).iter())
    }

    /// Layer index and table-level identifier of `id`, if present.
    pub fn find(&self, id: &NeuronId) -> Option<(usize, &NeuronId)> {
        (0..self.layers_count())
            .find_map(|idx| self.layer_ids(idx).iter().find(|n| *n == id).map(|n| (idx, n)))
    }

    /// Copy of the network with the incoming, outgoing and bias tables of
    /// hidden layer `idx` replaced.
    pub fn with_layer_tables(
        &self,
        idx: usize,
        incoming: WeightsTable,
        outgoing: WeightsTable,
        biases: BiasTable,
    ) -> Result<Self> {
        if idx == 0 || idx + 1 >= self.layers_count() {
            return Err(ArnnError::InvalidLayerIndex {
                index: idx,
                layers: self.layers_count(),
            });
        }
        let mut weights = self.weights.clone();
        let mut bias_tables = self.biases.clone();
        weights[idx - 1] = Arc::new(incoming);
        weights[idx] = Arc::new(outgoing);
        bias_tables[idx] = Arc::new(biases);
        Self::from_shared(weights, bias_tables, self.activations.clone())
    }

    /// Feed-forward pass over a batch. Rows of `inputs` are assignments in
    /// [`Network::input_ids`] order; rows of the result are outputs in
    /// [`Network::output_ids`] order.
    pub fn evaluate(&self, inputs: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let mut layers = self.evaluate_layers(inputs)?;
        layers
            .pop()
            .ok_or_else(|| ArnnError::structural("network has no layers"))
    }

    /// Feed-forward pass returning the raw inputs followed by the activated
    /// values of every later layer.
    pub fn evaluate_layers(&self, inputs: ArrayView2<'_, f64>) -> Result<Vec<Array2<f64>>> {
        if inputs.ncols() != self.input_ids().len() {
            return Err(ArnnError::structural(format!(
                "expected {} input columns, got {}",
                self.input_ids().len(),
                inputs.ncols()
            )));
        }
        let mut all = Vec::with_capacity(self.layers_count());
        all.push(inputs.to_owned());

        let mut current = inputs.to_owned();
        current += &self.biases[0].values();
        self.activations[0].apply_inplace(&mut current);

        for (i, w) in self.weights.iter().enumerate() {
            let mut next = current.dot(w.values());
            next += &self.biases[i + 1].values();
            self.activations[i + 1].apply_inplace(&mut next);
            all.push(next.clone());
            current = next;
        }
        Ok(all)
    }

    /// One-row input matrix for `assignment`.
    pub fn input_matrix(&self, assignment: &NeuronValues) -> Result<Array2<f64>> {
        let row = self
            .input_ids()
            .iter()
            .map(|id| {
                assignment
                    .get(id)
                    .copied()
                    .ok_or_else(|| ArnnError::MissingInput(id.to_string()))
            })
            .collect::<Result<Vec<f64>>>()?;
        let n = row.len();
        Array2::from_shape_vec((1, n), row).map_err(|e| ArnnError::structural(e.to_string()))
    }

    /// Output values for a single assignment.
    pub fn evaluate_assignment(&self, assignment: &NeuronValues) -> Result<NeuronValues> {
        let outputs = self.evaluate(self.input_matrix(assignment)?.view())?;
        Ok(self
            .output_ids()
            .iter()
            .cloned()
            .zip(outputs.row(0).iter().copied())
            .collect())
    }

    /// Value of every neuron for a single assignment. Input neurons map to
    /// their raw assigned values.
    pub fn evaluate_all(&self, assignment: &NeuronValues) -> Result<NeuronValues> {
        let layers = self.evaluate_layers(self.input_matrix(assignment)?.view())?;
        let mut values = NeuronValues::new();
        for (idx, layer_values) in layers.iter().enumerate() {
            for (id, v) in self.layer_ids(idx).iter().zip(layer_values.row(0).iter()) {
                values.insert(id.clone(), *v);
            }
        }
        Ok(values)
    }

    pub fn info(&self) -> NetworkInfo {
        let layers: Vec<usize> = (0..self.layers_count())
            .map(|idx| self.layer_ids(idx).len())
            .collect();
        let hidden_nodes = layers[1..layers.len() - 1].iter().sum();
        NetworkInfo {
            layers,
            hidden_nodes,
        }
    }

    /// Content hash over labels, values and activations. Equal networks have
    /// equal fingerprints.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.activations.hash(&mut hasher);
        let tables = self
            .weights
            .iter()
            .map(|w| w.as_ref())
            .chain(self.biases.iter().map(|b| b.as_table()));
        for table in tables {
            table.srcs().hash(&mut hasher);
            table.dests().hash(&mut hasher);
            for v in table.values() {
                v.to_bits().hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}
