//! Bound estimation used to tighten properties as the network changes.
//!
//! Two interchangeable estimators implement [`BoundEstimator`]:
//! - [`IntervalEstimator`]: naive interval arithmetic, layer by layer.
//! - [`PresolveEstimator`]: delegates to an external [`Presolver`] and
//!   memoizes its answers.
//!
//! [`update_property`] turns a pair of bound snapshots into a tightened
//! property; [`UpdatePropertyHelper`] wires an estimator to the original
//! network and property for the CEGAR loop.

mod interval;
mod presolve;
mod update;

pub use interval::{evaluate_bounds_naive, IntervalEstimator};
pub use presolve::{PresolveEstimator, Presolver};
pub use update::{update_property, PropertyUpdateMethod, UpdatePropertyHelper};

use arnn_core::{Network, NeuronBounds, Result};
use arnn_property::BasicProperty;

/// Per-neuron bounds of a network under the constraints of a property.
pub trait BoundEstimator {
    fn estimate(&mut self, network: &Network, property: &BasicProperty) -> Result<NeuronBounds>;
}
