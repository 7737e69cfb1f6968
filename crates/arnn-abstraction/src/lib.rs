//! Abstraction and refinement of feed-forward networks.
//!
//! - [`preprocess`] classifies hidden neurons by sign and scaling so they can
//!   be merged.
//! - [`abstract_layer`] and [`abstract_network`] merge same-typed neurons
//!   into abstract neurons, driven by an [`AbstractionStrategy`].
//! - [`refine_layer`] splits originals back out of an abstract neuron by
//!   replaying the surviving merges from the concrete tables.
//! - [`RefinementPolicy`] implementations pick what to refine after a
//!   spurious example; [`refine_network`] and [`refine_until_not_satisfying`]
//!   apply them.
//!
//! ## Example
//!
//! ```
//! use arnn_abstraction::{abstract_network, preprocess, CompleteAbstractionLeftToRight};
//! use arnn_core::random_network;
//!
//! let network = preprocess(&random_network(2, &[3, 4, 4], 1, 7).unwrap()).unwrap();
//! let abstracted = abstract_network(&network, &mut CompleteAbstractionLeftToRight::new()).unwrap();
//! assert!(abstracted.info().hidden_nodes <= network.info().hidden_nodes);
//! ```

mod abstraction;
mod policies;
mod preprocess;
mod refine;
mod strategies;
mod utils;

pub use abstraction::{
    abstract_biases, abstract_layer, abstract_network, abstract_weights_as_incoming, abstract_weights_as_outgoing,
    apply_abstraction, check_layer_index, AbstractionStrategy,
};
pub use policies::{
    natural_breaks, original_edges_weights_diff, RandomRefine, RefineByMaxActivations, RefineByMaxLoss,
    RefineByMaxLossClustered, RefinementContext, RefinementPolicy,
};
pub use preprocess::{classify_output_constraints, preprocess, preprocess_layers};
pub use refine::{
    apply_refinement, refine_layer, refine_network, refine_until_not_satisfying, RefinementStatistics,
    RefinementStep, Step,
};
pub use strategies::{
    group_name, simple_steps, CompleteAbstractionLeftToRight, CompleteAbstractionRightToLeft, ExplicitSteps,
    RandomAbstraction,
};
pub use utils::{
    grouped_refinement_steps_from_original_nodes, network_abstracted_neurons, original_to_abstract_mapping,
    refinement_steps_from_original_nodes, NeuronIdGenerator,
};

#[cfg(test)]
mod tests;
