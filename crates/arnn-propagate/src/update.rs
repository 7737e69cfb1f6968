//! Tightening output bounds after the network changed shape.

use crate::{BoundEstimator, IntervalEstimator};
use arnn_core::{ArnnError, Network, NeuronBounds, Result};
use arnn_property::{BasicConstraint, BasicProperty};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the CEGAR loop recomputes the property for the current network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyUpdateMethod {
    IntervalPropagation,
    Presolve,
}

/// Shift each output bound of `property` by how far the bounds moved between
/// `before` and `after`.
///
/// A lower bound moves up by `max(0, after.lower - before.upper)` and an
/// upper bound moves down by `min(0, after.upper - before.lower)`. Bounds are
/// clamped so they never end up looser than in `property`.
pub fn update_property(
    property: &BasicProperty,
    before: &NeuronBounds,
    after: &NeuronBounds,
) -> Result<BasicProperty> {
    let lookup = |bounds: &NeuronBounds, c: &BasicConstraint| {
        bounds
            .get(c.neuron())
            .copied()
            .ok_or_else(|| ArnnError::UnknownNeuron(format!("no bounds for {:?}", c.neuron())))
    };

    let mut output_constraints = Vec::with_capacity(property.output_constraints.len());
    for constraint in &property.output_constraints {
        let (b, a) = (lookup(before, constraint)?, lookup(after, constraint)?);
        let updated = match constraint {
            BasicConstraint::LowerBound { value, .. } => {
                let shifted = value + (a.lower - b.upper).max(0.0);
                shifted.max(*value)
            }
            BasicConstraint::UpperBound { value, .. } => {
                let shifted = value + (a.upper - b.lower).min(0.0);
                shifted.min(*value)
            }
        };
        debug!(neuron = %constraint.neuron(), before = ?b, after = ?a, from = constraint.value(), to = updated, "output bound");
        output_constraints.push(constraint.with_value(updated));
    }
    Ok(BasicProperty {
        input_constraints: property.input_constraints.clone(),
        output_constraints,
    })
}

/// Recomputes the property of the current (abstract) network from the
/// original network and property.
pub struct UpdatePropertyHelper {
    original_network: Network,
    original_property: BasicProperty,
    estimator: Box<dyn BoundEstimator>,
    original_bounds: Option<NeuronBounds>,
}

impl UpdatePropertyHelper {
    pub fn new(
        original_network: Network,
        original_property: BasicProperty,
        estimator: Box<dyn BoundEstimator>,
    ) -> Self {
        Self {
            original_network,
            original_property,
            estimator,
            original_bounds: None,
        }
    }

    /// Helper using [`IntervalEstimator`].
    pub fn interval(original_network: Network, original_property: BasicProperty) -> Self {
        Self::new(original_network, original_property, Box::new(IntervalEstimator))
    }

    pub fn original_property(&self) -> &BasicProperty {
        &self.original_property
    }

    pub fn update_property(&mut self, current: &Network) -> Result<BasicProperty> {
        let before = match self.original_bounds.take() {
            Some(bounds) => bounds,
            None => self
                .estimator
                .estimate(&self.original_network, &self.original_property)?,
        };
        let after = self.estimator.estimate(current, &self.original_property)?;
        let updated = update_property(&self.original_property, &before, &after);
        self.original_bounds = Some(before);
        updated
    }
}
