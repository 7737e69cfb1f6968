//! Neuron identifiers and their sign/scaling classification.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Sign of a neuron's outgoing edges after the positive/negative split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sign {
    Pos,
    Neg,
}

/// Whether increasing a neuron increases (`Inc`) or decreases (`Dec`) the
/// network output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scaling {
    Inc,
    Dec,
}

/// Classification of a neuron. Neurons may only be merged with neurons of the
/// same type.
pub type NeuronType = (Sign, Scaling);

/// Identifier of a neuron.
///
/// Equality, ordering and hashing use `(name, sign, scaling)` only. The
/// provenance set (`original_neurons`) is carried along but never compared:
/// an abstract neuron whose provenance shrinks after a partial refinement is
/// still the same neuron.
#[derive(Clone, Serialize, Deserialize)]
pub struct NeuronId {
    name: Arc<str>,
    sign: Option<Sign>,
    scaling: Option<Scaling>,
    #[serde(default)]
    original_neurons: Arc<BTreeSet<NeuronId>>,
}

impl NeuronId {
    /// Create an unclassified, concrete neuron.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            sign: None,
            scaling: None,
            original_neurons: Arc::default(),
        }
    }

    /// Create a concrete neuron with a full classification.
    pub fn classified(name: impl AsRef<str>, sign: Sign, scaling: Scaling) -> Self {
        Self::new(name).with_sign(sign).with_scaling(scaling)
    }

    /// Create an abstract neuron replacing `original_neurons`.
    ///
    /// `original_neurons` must only contain concrete neurons; callers merging
    /// abstract neurons flatten their provenance first.
    pub fn abstracted(
        name: impl AsRef<str>,
        sign: Option<Sign>,
        scaling: Option<Scaling>,
        original_neurons: BTreeSet<NeuronId>,
    ) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            sign,
            scaling,
            original_neurons: Arc::new(original_neurons),
        }
    }

    /// The synthetic source neuron of every bias table.
    pub fn unit() -> Self {
        Self::new("_unit")
    }

    pub fn with_sign(mut self, sign: Sign) -> Self {
        self.sign = Some(sign);
        self
    }

    pub fn with_scaling(mut self, scaling: Scaling) -> Self {
        self.scaling = Some(scaling);
        self
    }

    /// Same neuron under a different name. Provenance is kept.
    pub fn renamed(&self, name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sign(&self) -> Option<Sign> {
        self.sign
    }

    pub fn scaling(&self) -> Option<Scaling> {
        self.scaling
    }

    /// Concrete neurons this neuron replaces. Empty for concrete neurons.
    pub fn original_neurons(&self) -> &BTreeSet<NeuronId> {
        &self.original_neurons
    }

    pub fn is_abstract(&self) -> bool {
        !self.original_neurons.is_empty()
    }

    pub fn is_classified(&self) -> bool {
        self.sign.is_some() && self.scaling.is_some()
    }

    /// `(sign, scaling)` if the neuron is classified.
    pub fn neuron_type(&self) -> Option<NeuronType> {
        Some((self.sign?, self.scaling?))
    }

    /// Provenance flattened to concrete neurons: the neuron itself when it is
    /// concrete, its original neurons otherwise.
    pub fn flattened(&self) -> BTreeSet<NeuronId> {
        if self.is_abstract() {
            (*self.original_neurons).clone()
        } else {
            BTreeSet::from([self.clone()])
        }
    }

    fn key(&self) -> (&str, Option<Sign>, Option<Scaling>) {
        (&self.name, self.sign, self.scaling)
    }
}

impl PartialEq for NeuronId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for NeuronId {}

impl PartialOrd for NeuronId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NeuronId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for NeuronId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_abstract() {
            "AbstractedNeuronId"
        } else {
            "NeuronId"
        };
        write!(f, "{}({}, {:?}, {:?})", kind, self.name, self.sign, self.scaling)
    }
}

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for NeuronId {
    fn from(name: &str) -> Self {
        NeuronId::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_provenance() {
        let a = NeuronId::classified("a", Sign::Pos, Scaling::Inc);
        let originals = BTreeSet::from([NeuronId::new("x"), NeuronId::new("y")]);
        let b = NeuronId::abstracted("a", Some(Sign::Pos), Some(Scaling::Inc), originals);
        assert_eq!(a, b);
        assert!(!a.is_abstract());
        assert!(b.is_abstract());

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_equality_includes_type() {
        let pos = NeuronId::classified("a", Sign::Pos, Scaling::Inc);
        let neg = NeuronId::classified("a", Sign::Neg, Scaling::Inc);
        let dec = NeuronId::classified("a", Sign::Pos, Scaling::Dec);
        assert_ne!(pos, neg);
        assert_ne!(pos, dec);
        assert_ne!(pos, NeuronId::new("a"));
    }

    #[test]
    fn test_ordering_by_name_first() {
        let a = NeuronId::classified("a", Sign::Neg, Scaling::Dec);
        let b = NeuronId::new("b");
        assert!(a < b);
        assert!(NeuronId::new("a") < a);
    }

    #[test]
    fn test_neuron_type_requires_both_tags() {
        assert_eq!(NeuronId::new("a").neuron_type(), None);
        assert_eq!(NeuronId::new("a").with_sign(Sign::Pos).neuron_type(), None);
        assert_eq!(
            NeuronId::classified("a", Sign::Pos, Scaling::Dec).neuron_type(),
            Some((Sign::Pos, Scaling::Dec))
        );
    }

    #[test]
    fn test_flattened() {
        let x = NeuronId::new("x");
        assert_eq!(x.flattened(), BTreeSet::from([x.clone()]));
        let a = NeuronId::abstracted("a", None, None, BTreeSet::from([x.clone()]));
        assert_eq!(a.flattened(), BTreeSet::from([x]));
    }

    #[test]
    fn test_debug_marks_abstract_neurons() {
        let a = NeuronId::abstracted(
            "a",
            Some(Sign::Pos),
            Some(Scaling::Inc),
            BTreeSet::from([NeuronId::new("x")]),
        );
        assert!(format!("{:?}", a).starts_with("AbstractedNeuronId(a"));
        assert_eq!(a.to_string(), "a");
    }

    #[test]
    fn test_serde_roundtrip_keeps_provenance() {
        let a = NeuronId::abstracted(
            "a",
            Some(Sign::Neg),
            Some(Scaling::Dec),
            BTreeSet::from([NeuronId::new("x"), NeuronId::new("y")]),
        );
        let json = serde_json::to_string(&a).unwrap();
        let back: NeuronId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
        assert_eq!(back.original_neurons().len(), 2);
    }
}
