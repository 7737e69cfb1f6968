//! Network and property to SMT-LIB encoder.
//!
//! Encodes a [`Network`] exactly in `QF_LRA`: every neuron gets a `Real`
//! constant, affine layers become equalities and ReLU becomes `ite`.

use crate::{Result, SmtError};
use arnn_core::{ActivationFunction, Network, NeuronBounds, NeuronId};
use arnn_property::{is_finite_bound, BasicConstraint, BasicProperty};
use std::collections::BTreeMap;

/// SMT-LIB encoding of one network, ready to receive constraints.
#[derive(Debug, Clone)]
pub struct EncodedNetwork {
    declarations: Vec<String>,
    assertions: Vec<String>,
    /// Variable of each neuron, holding the value `Network::evaluate_all`
    /// reports for it.
    vars: BTreeMap<NeuronId, String>,
    input_vars: Vec<(NeuronId, String)>,
}

impl EncodedNetwork {
    pub fn var(&self, id: &NeuronId) -> Result<&str> {
        self.vars
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| SmtError::Encoding(format!("no variable for neuron {id:?}")))
    }

    /// Input neurons and their variables, in network order.
    pub fn input_vars(&self) -> &[(NeuronId, String)] {
        &self.input_vars
    }

    pub fn assertion_count(&self) -> usize {
        self.assertions.len()
    }

    pub fn assert_constraint(&mut self, constraint: &BasicConstraint) -> Result<()> {
        let var = self.var(constraint.neuron())?.to_string();
        let op = if constraint.is_lower() { ">=" } else { "<=" };
        self.assertions
            .push(format!("(assert ({op} {var} {}))", real_literal(constraint.value())?));
        Ok(())
    }

    /// Assert every constraint of `property`.
    pub fn assert_property(&mut self, property: &BasicProperty) -> Result<()> {
        for constraint in property.input_constraints.iter().chain(&property.output_constraints) {
            self.assert_constraint(constraint)?;
        }
        Ok(())
    }

    /// Assert the finite sides of `bounds`. `±INF` sides are left open.
    pub fn assert_bounds(&mut self, bounds: &NeuronBounds) -> Result<()> {
        for (id, bound) in bounds {
            if is_finite_bound(bound.lower) {
                self.assert_constraint(&BasicConstraint::lower(id.clone(), bound.lower))?;
            }
            if is_finite_bound(bound.upper) {
                self.assert_constraint(&BasicConstraint::upper(id.clone(), bound.upper))?;
            }
        }
        Ok(())
    }

    /// The full query: logic, declarations, assertions, then `commands`.
    pub fn to_query(&self, options: &[&str], commands: &[&str]) -> String {
        let mut query = String::new();
        for option in options {
            query.push_str(option);
            query.push('\n');
        }
        query.push_str("(set-logic QF_LRA)\n");
        for line in self.declarations.iter().chain(&self.assertions) {
            query.push_str(line);
            query.push('\n');
        }
        for command in commands {
            query.push_str(command);
            query.push('\n');
        }
        query
    }
}

/// Encoder for [`Network`]s.
#[derive(Debug, Default)]
pub struct QueryEncoder {
    declarations: Vec<String>,
    assertions: Vec<String>,
}

impl QueryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn declare_real(&mut self, name: &str) {
        self.declarations.push(format!("(declare-const {name} Real)"));
    }

    fn add_constraint(&mut self, constraint: &str) {
        self.assertions.push(format!("(assert {constraint})"));
    }

    /// Encode `network` layer by layer.
    ///
    /// Neuron `i` of layer `l` is `n{l}_{i}`. Inputs hold raw values; the
    /// input layer's bias and activation are applied on the way into the
    /// first weights table, matching the evaluator.
    pub fn encode(mut self, network: &Network) -> Result<EncodedNetwork> {
        let mut vars = BTreeMap::new();
        let mut input_vars = Vec::new();
        let mut feed = Vec::new();

        let input_biases = network.biases()[0].values();
        for (i, id) in network.input_ids().iter().enumerate() {
            let var = format!("n0_{i}");
            self.declare_real(&var);
            let shifted = affine(&[(1.0, var.as_str())], input_biases[i])?;
            feed.push(self.activate(network.activations()[0], &format!("f0_{i}"), shifted));
            vars.insert(id.clone(), var.clone());
            input_vars.push((id.clone(), var));
        }

        for (t, table) in network.weights().iter().enumerate() {
            let layer = t + 1;
            let biases = network.biases()[layer].values();
            let activation = network.activations()[layer];
            let mut next = Vec::with_capacity(table.dests().len());
            for (j, id) in table.dests().iter().enumerate() {
                let terms: Vec<(f64, &str)> = feed
                    .iter()
                    .enumerate()
                    .map(|(i, x)| (table.values()[[i, j]], x.as_str()))
                    .collect();
                let var = format!("n{layer}_{j}");
                let pre = affine(&terms, biases[j])?;
                let value = match activation {
                    ActivationFunction::Id => {
                        self.declare_real(&var);
                        self.add_constraint(&format!("(= {var} {pre})"));
                        var.clone()
                    }
                    ActivationFunction::Relu => self.activate(activation, &var, pre),
                };
                vars.insert(id.clone(), value.clone());
                next.push(value);
            }
            feed = next;
        }

        Ok(EncodedNetwork {
            declarations: self.declarations,
            assertions: self.assertions,
            vars,
            input_vars,
        })
    }

    /// Variable named `var` holding `activation(expr)`, or `expr` itself
    /// when the activation is the identity and `expr` is already a variable.
    fn activate(&mut self, activation: ActivationFunction, var: &str, expr: String) -> String {
        match activation {
            ActivationFunction::Id if is_symbol(&expr) => expr,
            ActivationFunction::Id => {
                self.declare_real(var);
                self.add_constraint(&format!("(= {var} {expr})"));
                var.to_string()
            }
            ActivationFunction::Relu => {
                let pre = format!("p{}", &var[1..]);
                self.declare_real(&pre);
                self.declare_real(var);
                self.add_constraint(&format!("(= {pre} {expr})"));
                self.add_constraint(&format!("(= {var} (ite (>= {pre} 0.0) {pre} 0.0))"));
                var.to_string()
            }
        }
    }
}

fn is_symbol(expr: &str) -> bool {
    !expr.starts_with('(') && expr.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// `sum(w * x) + b` as an SMT-LIB term. Zero weights are skipped.
fn affine(terms: &[(f64, &str)], bias: f64) -> Result<String> {
    let mut parts = Vec::with_capacity(terms.len() + 1);
    for &(w, x) in terms {
        if w == 0.0 {
            continue;
        }
        if w == 1.0 {
            parts.push(x.to_string());
        } else {
            parts.push(format!("(* {} {x})", real_literal(w)?));
        }
    }
    if bias != 0.0 {
        parts.push(real_literal(bias)?);
    }
    Ok(match parts.len() {
        0 => "0.0".to_string(),
        1 => parts.swap_remove(0),
        _ => format!("(+ {})", parts.join(" ")),
    })
}

/// SMT-LIB decimal for `value`: `1.5`, `(- 2.0)`. Non-finite values cannot
/// be encoded.
pub fn real_literal(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(SmtError::Encoding(format!("cannot encode {value}")));
    }
    let mut digits = format!("{}", value.abs());
    if !digits.contains('.') {
        digits.push_str(".0");
    }
    Ok(if value.is_sign_negative() && value != 0.0 {
        format!("(- {digits})")
    } else {
        digits
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arnn_core::{random_network, Bound, BiasTable, WeightsTable, INF};

    /// x0, x1 -> relu(h) -> y, with h = x0 - 2 x1 + 1 and y = 3 h.
    fn tiny() -> Network {
        let x = vec![NeuronId::new("x0"), NeuronId::new("x1")];
        let h = vec![NeuronId::new("h")];
        let y = vec![NeuronId::new("y")];
        Network::new(
            vec![
                WeightsTable::from_rows(x.clone(), h.clone(), &[vec![1.0], vec![-2.0]]).unwrap(),
                WeightsTable::from_rows(h.clone(), y.clone(), &[vec![3.0]]).unwrap(),
            ],
            vec![
                BiasTable::zeros(x).unwrap(),
                BiasTable::new(h, vec![1.0]).unwrap(),
                BiasTable::zeros(y).unwrap(),
            ],
            vec![ActivationFunction::Id, ActivationFunction::Relu, ActivationFunction::Id],
        )
        .unwrap()
    }

    #[test]
    fn test_real_literal() {
        assert_eq!(real_literal(1.0).unwrap(), "1.0");
        assert_eq!(real_literal(0.25).unwrap(), "0.25");
        assert_eq!(real_literal(-3.5).unwrap(), "(- 3.5)");
        assert_eq!(real_literal(-0.0).unwrap(), "0.0");
        assert_eq!(real_literal(1e20).unwrap(), "100000000000000000000.0");
        assert!(real_literal(f64::NAN).is_err());
        assert!(real_literal(f64::INFINITY).is_err());
    }

    #[test]
    fn test_affine_skips_zero_terms() {
        assert_eq!(affine(&[(0.0, "a"), (1.0, "b")], 0.0).unwrap(), "b");
        assert_eq!(affine(&[(2.0, "a"), (-1.0, "b")], 0.5).unwrap(), "(+ (* 2.0 a) (* (- 1.0) b) 0.5)");
        assert_eq!(affine(&[(0.0, "a")], 0.0).unwrap(), "0.0");
    }

    #[test]
    fn test_encode_tiny_network() {
        let encoded = QueryEncoder::new().encode(&tiny()).unwrap();
        let query = encoded.to_query(&[], &["(check-sat)"]);
        assert!(query.starts_with("(set-logic QF_LRA)\n"));
        assert!(query.contains("(declare-const n0_0 Real)"));
        assert!(query.contains("(assert (= p1_0 (+ n0_0 (* (- 2.0) n0_1) 1.0)))"));
        assert!(query.contains("(assert (= n1_0 (ite (>= p1_0 0.0) p1_0 0.0)))"));
        assert!(query.contains("(assert (= n2_0 (* 3.0 n1_0)))"));
        assert!(query.ends_with("(check-sat)\n"));
        assert_eq!(encoded.var(&NeuronId::new("y")).unwrap(), "n2_0");
        assert_eq!(
            encoded.input_vars(),
            [(NeuronId::new("x0"), "n0_0".to_string()), (NeuronId::new("x1"), "n0_1".to_string())]
        );
    }

    #[test]
    fn test_property_and_bounds_become_assertions() {
        let mut encoded = QueryEncoder::new().encode(&tiny()).unwrap();
        let before = encoded.assertion_count();
        encoded
            .assert_property(&BasicProperty::new(
                vec![BasicConstraint::lower("x0", -1.0)],
                vec![BasicConstraint::upper("y", 2.0)],
            ))
            .unwrap();
        let bounds = NeuronBounds::from([(NeuronId::new("x1"), Bound::new(-INF, 4.0))]);
        encoded.assert_bounds(&bounds).unwrap();
        assert_eq!(encoded.assertion_count(), before + 3);

        let query = encoded.to_query(&["(set-option :produce-models true)"], &[]);
        assert!(query.starts_with("(set-option :produce-models true)\n(set-logic QF_LRA)"));
        assert!(query.contains("(assert (>= n0_0 (- 1.0)))"));
        assert!(query.contains("(assert (<= n2_0 2.0))"));
        assert!(query.contains("(assert (<= n0_1 4.0))"));
    }

    #[test]
    fn test_unknown_neuron_is_rejected() {
        let mut encoded = QueryEncoder::new().encode(&tiny()).unwrap();
        let err = encoded.assert_constraint(&BasicConstraint::lower("zzz", 0.0)).unwrap_err();
        assert!(matches!(err, SmtError::Encoding(_)));
    }

    #[test]
    fn test_every_neuron_gets_a_variable() {
        let network = random_network(3, &[4, 2], 2, 3).unwrap();
        let encoded = QueryEncoder::new().encode(&network).unwrap();
        for id in network.neuron_ids() {
            assert!(encoded.var(id).is_ok(), "{id:?}");
        }
    }
}
