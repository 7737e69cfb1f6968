//! Error types shared by every arnn crate.

use thiserror::Error;

/// Errors raised by the network model, the abstraction/refinement engines and
/// the property layer.
#[derive(Debug, Error)]
pub enum ArnnError {
    /// Layer adjacency or table shape invariant violated.
    #[error("Structural invariant violated: {0}")]
    Structural(String),

    /// Abstraction attempted on a neuron without sign and scaling.
    #[error("Neuron {0} is not classified (missing sign/scaling); was the network preprocessed?")]
    UnclassifiedNeuron(String),

    #[error("Invalid abstraction step: {0}")]
    InvalidAbstractionStep(String),

    #[error("Invalid refinement step: {0}")]
    InvalidRefinementStep(String),

    /// Abstraction/refinement targeted the input or output layer, or an
    /// index past the end of the network.
    #[error("Invalid layer index {index} for a network with {layers} layers (expected 1 < index < layers - 1)")]
    InvalidLayerIndex { index: usize, layers: usize },

    #[error("Invalid property: {0}")]
    InvalidProperty(String),

    #[error("Conjunction property mixes lower-bound and upper-bound constraints")]
    MixedRelationalOperator,

    /// The oracle's witness does not hold on the abstract network it was
    /// produced for. This is a bug in the oracle adapter.
    #[error("Oracle witness does not satisfy the abstract network it was drawn from: {}", reasons.join("; "))]
    SpuriousWitnessInconsistency { reasons: Vec<String> },

    #[error("Unknown neuron: {0}")]
    UnknownNeuron(String),

    #[error("Missing value for input neuron {0}")]
    MissingInput(String),

    #[error("Oracle failure: {0}")]
    Oracle(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ArnnError {
    /// Shorthand for a [`ArnnError::Structural`] error.
    pub fn structural(msg: impl Into<String>) -> Self {
        ArnnError::Structural(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ArnnError>;
