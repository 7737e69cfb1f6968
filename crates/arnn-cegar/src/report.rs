//! What a CEGAR run reports.

use arnn_abstraction::RefinementStatistics;
use arnn_core::{NetworkInfo, NeuronValues};
use arnn_smt::OracleStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Size of the network at each stage of the preparation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStages {
    pub original: NetworkInfo,
    /// After the property transform.
    pub prepared: NetworkInfo,
    pub preprocessed: NetworkInfo,
    /// Initial abstraction.
    pub abstracted: NetworkInfo,
    /// Network of the last oracle query.
    pub last: NetworkInfo,
}

/// One refinement after a spurious example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementRecord {
    pub iteration: usize,
    pub refinement_steps: usize,
    pub neurons_refined: usize,
    pub network: NetworkInfo,
}

impl RefinementRecord {
    pub(crate) fn new(iteration: usize, stats: &RefinementStatistics, network: NetworkInfo) -> Self {
        Self {
            iteration,
            refinement_steps: stats.num_steps,
            neurons_refined: stats.num_neurons_refined.iter().sum(),
            network,
        }
    }
}

/// Final outcome of [`crate::Cegar::run`].
///
/// `status` is [`OracleStatus::Unsat`] when the property was proved on the
/// original network, [`OracleStatus::Sat`] with a `counterexample` when a
/// witness holds on the original network, and any other oracle status
/// verbatim. A run cut short by `max_iterations` reports
/// [`OracleStatus::Unknown`] with `iteration_limit_reached`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CegarReport {
    pub status: OracleStatus,
    /// Oracle queries made.
    pub iterations: usize,
    pub iteration_limit_reached: bool,
    /// Input values by neuron name.
    pub counterexample: Option<BTreeMap<String, f64>>,
    pub spurious_examples: usize,
    pub refinements: Vec<RefinementRecord>,
    pub networks: NetworkStages,
    pub elapsed: Duration,
}

impl CegarReport {
    pub fn is_proved(&self) -> bool {
        self.status == OracleStatus::Unsat
    }

    pub fn total_refinement_steps(&self) -> usize {
        self.refinements.iter().map(|r| r.refinement_steps).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub(crate) fn named_values(values: &NeuronValues) -> BTreeMap<String, f64> {
    values.iter().map(|(id, v)| (id.name().to_string(), *v)).collect()
}
