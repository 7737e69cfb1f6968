//! Verification properties for arnn.
//!
//! Three property shapes are supported. [`prepare_network`] rewrites any of
//! them into a `(Network, BasicProperty)` pair, the only form the oracle and
//! the CEGAR loop consume:
//! - [`BasicProperty`]: passed through unchanged.
//! - [`AdversarialProperty`]: the output layer is replaced by one neuron
//!   comparing the winner against the runner-up.
//! - [`ConjunctionProperty`]: one linear output layer is appended with a
//!   neuron per inequality.

mod adversarial;
mod basic;
mod conjunction;

pub use adversarial::{
    find_winner_and_runnerup, prepare_network_adversarial, AdversarialProperty,
    ADVERSARIAL_OUTPUT_NEURON,
};
pub use basic::{
    are_constraints_satisfied, is_finite_bound, is_satisfying_assignment, property_to_bounds,
    property_to_input_bounds, BasicConstraint, BasicProperty, SATISFACTION_TOLERANCE,
};
pub use conjunction::{prepare_network_conjunction, ConjunctionProperty, MultiVarConstraint, Term};

use arnn_core::{Network, Result};
use serde::{Deserialize, Serialize};

/// Any supported property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Property {
    Basic(BasicProperty),
    Adversarial(AdversarialProperty),
    Conjunction(ConjunctionProperty),
}

impl From<BasicProperty> for Property {
    fn from(p: BasicProperty) -> Self {
        Property::Basic(p)
    }
}

impl From<AdversarialProperty> for Property {
    fn from(p: AdversarialProperty) -> Self {
        Property::Adversarial(p)
    }
}

impl From<ConjunctionProperty> for Property {
    fn from(p: ConjunctionProperty) -> Self {
        Property::Conjunction(p)
    }
}

/// Rewrite `network` and `property` into the canonical basic form.
pub fn prepare_network(network: &Network, property: &Property) -> Result<(Network, BasicProperty)> {
    match property {
        Property::Basic(p) => Ok((network.clone(), p.clone())),
        Property::Adversarial(p) => prepare_network_adversarial(network, p),
        Property::Conjunction(p) => prepare_network_conjunction(network, p),
    }
}
