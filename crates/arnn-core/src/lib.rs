//! Core types for abstraction-refinement verification of neural networks.
//!
//! This crate provides the network model every other arnn crate works on:
//! neuron identifiers with sign/scaling classification and provenance,
//! labelled weight and bias tables that remember their abstraction history,
//! and the layered [`Network`] with its feed-forward evaluation.

mod bound;
mod error;
mod network;
mod neuron;
mod random;
mod step;
mod table;

pub use bound::{Bound, NeuronBounds, INF};
pub use error::{ArnnError, Result};
pub use network::{ActivationFunction, Layer, LayerType, Network, NetworkInfo, NeuronValues};
pub use neuron::{NeuronId, NeuronType, Scaling, Sign};
pub use random::{random_network, random_network_with};
pub use step::AbstractionStep;
pub use table::{Aggregation, BiasTable, HistoryEntry, TableAxis, WeightsTable};
