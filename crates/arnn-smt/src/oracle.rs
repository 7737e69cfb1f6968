use arnn_core::{Network, NeuronValues, Result};
use arnn_property::BasicProperty;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Answer of a decision procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OracleStatus {
    Sat,
    Unsat,
    Unknown,
    Timeout,
    Error,
    QuitRequested,
}

impl OracleStatus {
    /// Whether the answer settles the query.
    pub fn is_conclusive(self) -> bool {
        matches!(self, OracleStatus::Sat | OracleStatus::Unsat)
    }
}

impl fmt::Display for OracleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OracleStatus::Sat => "SAT",
            OracleStatus::Unsat => "UNSAT",
            OracleStatus::Unknown => "UNKNOWN",
            OracleStatus::Timeout => "TIMEOUT",
            OracleStatus::Error => "ERROR",
            OracleStatus::QuitRequested => "QUIT_REQUESTED",
        };
        f.write_str(s)
    }
}

/// Status plus, on [`OracleStatus::Sat`], a value for every input neuron.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OracleOutcome {
    pub status: OracleStatus,
    pub assignment: Option<NeuronValues>,
}

impl OracleOutcome {
    pub fn sat(assignment: NeuronValues) -> Self {
        Self {
            status: OracleStatus::Sat,
            assignment: Some(assignment),
        }
    }

    pub fn unsat() -> Self {
        Self::without_assignment(OracleStatus::Unsat)
    }

    pub fn without_assignment(status: OracleStatus) -> Self {
        Self {
            status,
            assignment: None,
        }
    }
}

/// A decision procedure: is there an input assignment of `network`
/// satisfying every constraint of `property`?
pub trait Oracle {
    fn check(&mut self, network: &Network, property: &BasicProperty) -> Result<OracleOutcome>;
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn check(&mut self, network: &Network, property: &BasicProperty) -> Result<OracleOutcome> {
        (**self).check(network, property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_and_serde_names_agree() {
        for status in [
            OracleStatus::Sat,
            OracleStatus::Unsat,
            OracleStatus::Unknown,
            OracleStatus::Timeout,
            OracleStatus::Error,
            OracleStatus::QuitRequested,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            assert_eq!(serde_json::from_str::<OracleStatus>(&json).unwrap(), status);
        }
    }

    #[test]
    fn test_only_sat_and_unsat_are_conclusive() {
        assert!(OracleStatus::Sat.is_conclusive());
        assert!(OracleStatus::Unsat.is_conclusive());
        assert!(!OracleStatus::Timeout.is_conclusive());
        assert!(!OracleStatus::QuitRequested.is_conclusive());
        assert_eq!(OracleOutcome::unsat().assignment, None);
    }
}
