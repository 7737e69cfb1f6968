//! Per-neuron bound constraints, the canonical property form handed to the
//! oracle.

use arnn_core::{ArnnError, Bound, Network, NeuronBounds, NeuronId, NeuronValues, Result, INF};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Differences smaller than this are not violations.
pub const SATISFACTION_TOLERANCE: f64 = 1e-4;

/// A bound on a single neuron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum BasicConstraint {
    LowerBound { neuron: NeuronId, value: f64 },
    UpperBound { neuron: NeuronId, value: f64 },
}

impl BasicConstraint {
    pub fn lower(neuron: impl Into<NeuronId>, value: f64) -> Self {
        BasicConstraint::LowerBound {
            neuron: neuron.into(),
            value,
        }
    }

    pub fn upper(neuron: impl Into<NeuronId>, value: f64) -> Self {
        BasicConstraint::UpperBound {
            neuron: neuron.into(),
            value,
        }
    }

    pub fn neuron(&self) -> &NeuronId {
        match self {
            BasicConstraint::LowerBound { neuron, .. } | BasicConstraint::UpperBound { neuron, .. } => neuron,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            BasicConstraint::LowerBound { value, .. } | BasicConstraint::UpperBound { value, .. } => *value,
        }
    }

    pub fn is_lower(&self) -> bool {
        matches!(self, BasicConstraint::LowerBound { .. })
    }

    /// Same constraint on another neuron.
    pub fn with_neuron(&self, neuron: NeuronId) -> Self {
        match self {
            BasicConstraint::LowerBound { value, .. } => BasicConstraint::LowerBound { neuron, value: *value },
            BasicConstraint::UpperBound { value, .. } => BasicConstraint::UpperBound { neuron, value: *value },
        }
    }

    /// Same constraint with another bound value.
    pub fn with_value(&self, value: f64) -> Self {
        match self {
            BasicConstraint::LowerBound { neuron, .. } => BasicConstraint::LowerBound {
                neuron: neuron.clone(),
                value,
            },
            BasicConstraint::UpperBound { neuron, .. } => BasicConstraint::UpperBound {
                neuron: neuron.clone(),
                value,
            },
        }
    }

    /// Check the constraint against `values` and explain the outcome.
    pub fn check(&self, values: &NeuronValues) -> Result<(bool, String)> {
        let actual = values
            .get(self.neuron())
            .copied()
            .ok_or_else(|| ArnnError::UnknownNeuron(format!("{:?}", self.neuron())))?;
        let name = self.neuron().name();
        Ok(match self {
            BasicConstraint::LowerBound { value, .. } => {
                if exceeds(*value, actual) {
                    (false, format!("({actual} = {name}) < (lowerbound = {value})"))
                } else {
                    (true, format!("({actual} = {name}) >= (lowerbound = {value})"))
                }
            }
            BasicConstraint::UpperBound { value, .. } => {
                if exceeds(actual, *value) {
                    (false, format!("({actual} = {name}) > (upperbound = {value})"))
                } else {
                    (true, format!("({actual} = {name}) <= (upperbound = {value})"))
                }
            }
        })
    }
}

/// `a > b` by more than [`SATISFACTION_TOLERANCE`].
fn exceeds(a: f64, b: f64) -> bool {
    let diff = a - b;
    diff.abs() >= SATISFACTION_TOLERANCE && diff > 0.0
}

impl fmt::Display for BasicConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BasicConstraint::LowerBound { neuron, value } => write!(f, "{neuron} >= {value}"),
            BasicConstraint::UpperBound { neuron, value } => write!(f, "{neuron} <= {value}"),
        }
    }
}

/// Input and output bounds. An assignment satisfies the property when every
/// constraint holds; the oracle searches for such an assignment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BasicProperty {
    pub input_constraints: Vec<BasicConstraint>,
    pub output_constraints: Vec<BasicConstraint>,
}

impl BasicProperty {
    pub fn new(input_constraints: Vec<BasicConstraint>, output_constraints: Vec<BasicConstraint>) -> Self {
        Self {
            input_constraints,
            output_constraints,
        }
    }
}

/// Whether every constraint in `constraints` holds on `values`.
pub fn are_constraints_satisfied(values: &NeuronValues, constraints: &[BasicConstraint]) -> Result<bool> {
    for constraint in constraints {
        if !constraint.check(values)?.0 {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluate `network` on `assignment` and check `property`.
///
/// Input constraints are checked first; if any fails the result is
/// `(false, ["inputs"])`. Otherwise every output constraint is checked and
/// explained, in order.
pub fn is_satisfying_assignment(
    network: &Network,
    assignment: &NeuronValues,
    property: &BasicProperty,
) -> Result<(bool, Vec<String>)> {
    if !are_constraints_satisfied(assignment, &property.input_constraints)? {
        return Ok((false, vec!["inputs".to_string()]));
    }
    let outputs = network.evaluate_assignment(assignment)?;
    let mut satisfied = true;
    let mut reasons = Vec::with_capacity(property.output_constraints.len());
    for constraint in &property.output_constraints {
        let (ok, why) = constraint.check(&outputs)?;
        satisfied &= ok;
        reasons.push(why);
    }
    Ok((satisfied, reasons))
}

fn collect_bounds<'a>(constraints: impl Iterator<Item = &'a BasicConstraint>) -> NeuronBounds {
    let mut bounds = NeuronBounds::new();
    for constraint in constraints {
        let bound = bounds
            .entry(constraint.neuron().clone())
            .or_insert_with(Bound::unbounded);
        match constraint {
            BasicConstraint::LowerBound { value, .. } => bound.lower = *value,
            BasicConstraint::UpperBound { value, .. } => bound.upper = *value,
        }
    }
    bounds
}

/// Input bounds of `property`. Missing sides are `±INF`.
pub fn property_to_input_bounds(property: &BasicProperty) -> NeuronBounds {
    collect_bounds(property.input_constraints.iter())
}

/// Input and output bounds of `property`. Missing sides are `±INF`.
pub fn property_to_bounds(property: &BasicProperty) -> NeuronBounds {
    collect_bounds(
        property
            .input_constraints
            .iter()
            .chain(property.output_constraints.iter()),
    )
}

/// Whether `value` is a real bound rather than the unbounded sentinel.
pub fn is_finite_bound(value: f64) -> bool {
    value.is_finite() && value.abs() < INF
}

#[cfg(test)]
mod tests {
    use super::*;
    use arnn_core::{ActivationFunction, BiasTable, WeightsTable};
    use ndarray::arr2;

    fn identity_network() -> Network {
        let x = vec![NeuronId::new("x0")];
        let y = vec![NeuronId::new("y0")];
        Network::new(
            vec![WeightsTable::new(x.clone(), y.clone(), arr2(&[[2.0]])).unwrap()],
            vec![BiasTable::zeros(x).unwrap(), BiasTable::zeros(y).unwrap()],
            vec![ActivationFunction::Id, ActivationFunction::Id],
        )
        .unwrap()
    }

    fn property() -> BasicProperty {
        BasicProperty::new(
            vec![BasicConstraint::lower("x0", 0.0), BasicConstraint::upper("x0", 1.0)],
            vec![BasicConstraint::lower("y0", 1.5)],
        )
    }

    #[test]
    fn test_satisfying_assignment() {
        let values = NeuronValues::from([(NeuronId::new("x0"), 1.0)]);
        let (ok, why) = is_satisfying_assignment(&identity_network(), &values, &property()).unwrap();
        assert!(ok);
        assert_eq!(why, vec!["(2 = y0) >= (lowerbound = 1.5)".to_string()]);
    }

    #[test]
    fn test_violated_output_is_explained() {
        let values = NeuronValues::from([(NeuronId::new("x0"), 0.5)]);
        let (ok, why) = is_satisfying_assignment(&identity_network(), &values, &property()).unwrap();
        assert!(!ok);
        assert_eq!(why, vec!["(1 = y0) < (lowerbound = 1.5)".to_string()]);
    }

    #[test]
    fn test_inputs_checked_first() {
        let values = NeuronValues::from([(NeuronId::new("x0"), 3.0)]);
        let (ok, why) = is_satisfying_assignment(&identity_network(), &values, &property()).unwrap();
        assert!(!ok);
        assert_eq!(why, vec!["inputs".to_string()]);
    }

    #[test]
    fn test_tolerance() {
        let values = NeuronValues::from([(NeuronId::new("y0"), 1.49995)]);
        assert!(BasicConstraint::lower("y0", 1.5).check(&values).unwrap().0);
        let values = NeuronValues::from([(NeuronId::new("y0"), 1.4998)]);
        assert!(!BasicConstraint::lower("y0", 1.5).check(&values).unwrap().0);
        let values = NeuronValues::from([(NeuronId::new("y0"), 1.50005)]);
        assert!(BasicConstraint::upper("y0", 1.5).check(&values).unwrap().0);
    }

    #[test]
    fn test_unknown_neuron() {
        let err = BasicConstraint::lower("z", 0.0)
            .check(&NeuronValues::new())
            .unwrap_err();
        assert!(matches!(err, ArnnError::UnknownNeuron(_)));
    }

    #[test]
    fn test_property_to_bounds() {
        let input = property_to_input_bounds(&property());
        assert_eq!(input.len(), 1);
        assert_eq!(input[&NeuronId::new("x0")], Bound::new(0.0, 1.0));

        let all = property_to_bounds(&property());
        let y = all[&NeuronId::new("y0")];
        assert_eq!(y.lower, 1.5);
        assert_eq!(y.upper, INF);
        assert!(!is_finite_bound(y.upper));
    }

    #[test]
    fn test_serde_tagged_constraints() {
        let json = serde_json::to_string(&property()).unwrap();
        assert!(json.contains("\"kind\":\"LowerBound\""));
        let back: BasicProperty = serde_json::from_str(&json).unwrap();
        assert_eq!(back, property());
    }
}
