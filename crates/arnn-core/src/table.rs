//! Weight and bias tables with abstraction history.
//!
//! A [`WeightsTable`] maps `srcs × dests → weight`. Every table produced by a
//! merge remembers:
//! - its `origin`: the fully concrete table it was derived from, shared and
//!   never mutated;
//! - its `history`: the ordered `(axis, step)` merges applied on top of the
//!   origin.
//!
//! Replaying the history against the origin reproduces the table; replaying a
//! filtered history is how refinement undoes merges.

use crate::{AbstractionStep, ArnnError, NeuronId, Result, Scaling};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::collections::HashSet;
use std::sync::Arc;

/// Which axis of a table a merge was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableAxis {
    /// Merged neurons were sources (outgoing edges of the group).
    Rows,
    /// Merged neurons were destinations (incoming edges of the group).
    Columns,
}

/// Aggregation applied to the merged rows/columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Max,
    Min,
    Sum,
}

impl Aggregation {
    /// `Max` for increasing groups, `Min` otherwise.
    pub fn for_scaling(scaling: Option<Scaling>) -> Self {
        if scaling == Some(Scaling::Inc) {
            Aggregation::Max
        } else {
            Aggregation::Min
        }
    }

    pub fn apply(self, values: impl IntoIterator<Item = f64>) -> f64 {
        let values = values.into_iter();
        match self {
            Aggregation::Max => values.fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Min => values.fold(f64::INFINITY, f64::min),
            Aggregation::Sum => values.sum(),
        }
    }
}

pub type HistoryEntry = (TableAxis, AbstractionStep);

/// Dense weight matrix labelled by neuron identifiers.
#[derive(Debug, Clone)]
pub struct WeightsTable {
    srcs: Vec<NeuronId>,
    dests: Vec<NeuronId>,
    values: Array2<f64>,
    origin: Option<Arc<WeightsTable>>,
    history: Vec<HistoryEntry>,
}

impl WeightsTable {
    /// Create a concrete table. `values` has shape `(srcs.len(), dests.len())`.
    pub fn new(srcs: Vec<NeuronId>, dests: Vec<NeuronId>, values: Array2<f64>) -> Result<Self> {
        if values.dim() != (srcs.len(), dests.len()) {
            return Err(ArnnError::structural(format!(
                "weights shape {:?} does not match {} sources x {} destinations",
                values.dim(),
                srcs.len(),
                dests.len()
            )));
        }
        ensure_unique(&srcs, "source")?;
        ensure_unique(&dests, "destination")?;
        Ok(Self {
            srcs,
            dests,
            values,
            origin: None,
            history: Vec::new(),
        })
    }

    /// Create a concrete table from row-major rows.
    pub fn from_rows(srcs: Vec<NeuronId>, dests: Vec<NeuronId>, rows: &[Vec<f64>]) -> Result<Self> {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let values = Array2::from_shape_vec((rows.len(), dests.len()), flat)
            .map_err(|e| ArnnError::structural(format!("ragged weight rows: {e}")))?;
        Self::new(srcs, dests, values)
    }

    pub fn srcs(&self) -> &[NeuronId] {
        &self.srcs
    }

    pub fn dests(&self) -> &[NeuronId] {
        &self.dests
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn src_index(&self, id: &NeuronId) -> Option<usize> {
        self.srcs.iter().position(|s| s == id)
    }

    pub fn dest_index(&self, id: &NeuronId) -> Option<usize> {
        self.dests.iter().position(|d| d == id)
    }

    /// The stored identifier equal to `id`, carrying the table's provenance.
    pub fn src_id(&self, id: &NeuronId) -> Option<&NeuronId> {
        self.srcs.iter().find(|s| *s == id)
    }

    pub fn get(&self, src: &NeuronId, dest: &NeuronId) -> Option<f64> {
        Some(self.values[[self.src_index(src)?, self.dest_index(dest)?]])
    }

    /// The concrete table this one was derived from, or `self` for a table
    /// that never went through a merge.
    pub fn origin(&self) -> &WeightsTable {
        self.origin.as_deref().unwrap_or(self)
    }

    pub fn is_abstracted(&self) -> bool {
        self.origin.is_some()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Copy of the origin with no history, ready for a replay.
    pub fn concrete_origin(&self) -> WeightsTable {
        let origin = self.origin();
        WeightsTable {
            srcs: origin.srcs.clone(),
            dests: origin.dests.clone(),
            values: origin.values.clone(),
            origin: None,
            history: Vec::new(),
        }
    }

    /// Merge `step.nodes()` destinations into `step.new_name()` using
    /// `aggregation` per source row.
    pub fn merge_columns(&self, step: &AbstractionStep, aggregation: Aggregation) -> Result<Self> {
        let merged = indices_of(&self.dests, step, "destination")?;
        let aggregated: Array1<f64> = self
            .values
            .axis_iter(Axis(0))
            .map(|row| aggregation.apply(merged.iter().map(|&j| row[j])))
            .collect();

        let (dests, columns) = merged_lanes(&self.dests, &self.values, Axis(1), &merged, step, aggregated)?;
        let mut values = Array2::zeros((self.srcs.len(), dests.len()));
        for (j, column) in columns.iter().enumerate() {
            values.column_mut(j).assign(column);
        }
        Ok(self.derived(self.srcs.clone(), dests, values, TableAxis::Columns, step))
    }

    /// Merge `step.nodes()` sources into `step.new_name()` using
    /// `aggregation` per destination column.
    pub fn merge_rows(&self, step: &AbstractionStep, aggregation: Aggregation) -> Result<Self> {
        let merged = indices_of(&self.srcs, step, "source")?;
        let aggregated: Array1<f64> = self
            .values
            .axis_iter(Axis(1))
            .map(|column| aggregation.apply(merged.iter().map(|&i| column[i])))
            .collect();

        let (srcs, rows) = merged_lanes(&self.srcs, &self.values, Axis(0), &merged, step, aggregated)?;
        let mut values = Array2::zeros((srcs.len(), self.dests.len()));
        for (i, row) in rows.iter().enumerate() {
            values.row_mut(i).assign(row);
        }
        Ok(self.derived(srcs, self.dests.clone(), values, TableAxis::Rows, step))
    }

    fn derived(
        &self,
        srcs: Vec<NeuronId>,
        dests: Vec<NeuronId>,
        values: Array2<f64>,
        axis: TableAxis,
        step: &AbstractionStep,
    ) -> Self {
        let origin = match &self.origin {
            Some(origin) => Arc::clone(origin),
            None => Arc::new(self.clone()),
        };
        let mut history = self.history.clone();
        history.push((axis, step.clone()));
        Self {
            srcs,
            dests,
            values,
            origin: Some(origin),
            history,
        }
    }
}

/// Tables compare by labels and values. Origin and history are bookkeeping.
impl PartialEq for WeightsTable {
    fn eq(&self, other: &Self) -> bool {
        self.srcs == other.srcs && self.dests == other.dests && self.values == other.values
    }
}

fn ensure_unique(ids: &[NeuronId], what: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id) {
            return Err(ArnnError::structural(format!("duplicate {what} label {id:?}")));
        }
    }
    Ok(())
}

fn indices_of(labels: &[NeuronId], step: &AbstractionStep, what: &str) -> Result<Vec<usize>> {
    step.nodes()
        .iter()
        .map(|node| {
            labels
                .iter()
                .position(|l| l == node)
                .ok_or_else(|| ArnnError::UnknownNeuron(format!("{what} {node:?}")))
        })
        .collect()
}

/// Labels and lanes (rows or columns) after replacing `merged` by the
/// aggregated lane, sorted by label.
fn merged_lanes(
    labels: &[NeuronId],
    values: &Array2<f64>,
    axis: Axis,
    merged: &[usize],
    step: &AbstractionStep,
    aggregated: Array1<f64>,
) -> Result<(Vec<NeuronId>, Vec<Array1<f64>>)> {
    let mut lanes: Vec<(NeuronId, Array1<f64>)> = labels
        .iter()
        .enumerate()
        .filter(|(k, _)| !merged.contains(k))
        .map(|(k, id)| (id.clone(), values.index_axis(axis, k).to_owned()))
        .collect();
    if lanes.iter().any(|(id, _)| id == step.new_name()) {
        return Err(ArnnError::InvalidAbstractionStep(format!(
            "{:?} already names another neuron",
            step.new_name()
        )));
    }
    lanes.push((step.new_name().clone(), aggregated));
    lanes.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(lanes.into_iter().unzip())
}

/// Biases of one layer: a [`WeightsTable`] with the single [`NeuronId::unit`]
/// source row.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasTable(WeightsTable);

impl BiasTable {
    pub fn new(ids: Vec<NeuronId>, biases: Vec<f64>) -> Result<Self> {
        if ids.len() != biases.len() {
            return Err(ArnnError::structural(format!(
                "{} bias values for {} neurons",
                biases.len(),
                ids.len()
            )));
        }
        let n = ids.len();
        let values = Array2::from_shape_vec((1, n), biases)
            .map_err(|e| ArnnError::structural(e.to_string()))?;
        Ok(Self(WeightsTable::new(vec![NeuronId::unit()], ids, values)?))
    }

    pub fn zeros(ids: Vec<NeuronId>) -> Result<Self> {
        let n = ids.len();
        Self::new(ids, vec![0.0; n])
    }

    /// Wrap a table whose only source is [`NeuronId::unit`].
    pub fn from_table(table: WeightsTable) -> Result<Self> {
        if table.srcs() != [NeuronId::unit()] {
            return Err(ArnnError::structural("bias table must have exactly the unit row"));
        }
        Ok(Self(table))
    }

    pub fn ids(&self) -> &[NeuronId] {
        self.0.dests()
    }

    pub fn get(&self, id: &NeuronId) -> Option<f64> {
        self.0.dest_index(id).map(|j| self.0.values()[[0, j]])
    }

    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.0.values().row(0)
    }

    pub fn as_table(&self) -> &WeightsTable {
        &self.0
    }

    pub fn into_table(self) -> WeightsTable {
        self.0
    }

    pub fn merge(&self, step: &AbstractionStep, aggregation: Aggregation) -> Result<Self> {
        Ok(Self(self.0.merge_columns(step, aggregation)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sign;
    use ndarray::arr2;

    fn pi(name: &str) -> NeuronId {
        NeuronId::classified(name, Sign::Pos, Scaling::Inc)
    }

    fn table() -> WeightsTable {
        WeightsTable::new(
            vec![NeuronId::new("x0"), NeuronId::new("x1")],
            vec![pi("h1"), pi("h2"), pi("h3")],
            arr2(&[[1.0, 5.0, -2.0], [4.0, 2.0, 0.5]]),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_shape_mismatch() {
        let err = WeightsTable::new(
            vec![NeuronId::new("x0")],
            vec![NeuronId::new("h")],
            arr2(&[[1.0, 2.0]]),
        )
        .unwrap_err();
        assert!(matches!(err, ArnnError::Structural(_)));
    }

    #[test]
    fn test_new_rejects_duplicate_labels() {
        let err = WeightsTable::new(
            vec![NeuronId::new("x0"), NeuronId::new("x0")],
            vec![NeuronId::new("h")],
            arr2(&[[1.0], [2.0]]),
        )
        .unwrap_err();
        assert!(matches!(err, ArnnError::Structural(_)));
    }

    #[test]
    fn test_merge_columns_max() {
        let t = table();
        let step = AbstractionStep::new("a", [pi("h1"), pi("h2")]).unwrap();
        let merged = t.merge_columns(&step, Aggregation::Max).unwrap();

        assert_eq!(merged.dests(), &[pi("a"), pi("h3")]);
        assert_eq!(merged.get(&NeuronId::new("x0"), &pi("a")), Some(5.0));
        assert_eq!(merged.get(&NeuronId::new("x1"), &pi("a")), Some(4.0));
        assert_eq!(merged.get(&NeuronId::new("x0"), &pi("h3")), Some(-2.0));
        assert_eq!(merged.history().len(), 1);
        assert_eq!(merged.history()[0].0, TableAxis::Columns);
        assert_eq!(merged.origin(), &t);
    }

    #[test]
    fn test_merge_rows_sum() {
        let t = WeightsTable::new(
            vec![pi("h1"), pi("h2")],
            vec![NeuronId::new("y")],
            arr2(&[[1.5], [2.0]]),
        )
        .unwrap();
        let step = AbstractionStep::new("a", [pi("h1"), pi("h2")]).unwrap();
        let merged = t.merge_rows(&step, Aggregation::Sum).unwrap();
        assert_eq!(merged.srcs(), &[pi("a")]);
        assert_eq!(merged.values(), &arr2(&[[3.5]]));
        assert_eq!(merged.history()[0].0, TableAxis::Rows);
    }

    #[test]
    fn test_origin_is_kept_across_merges() {
        let t = table();
        let first = AbstractionStep::new("a", [pi("h1"), pi("h2")]).unwrap();
        let once = t.merge_columns(&first, Aggregation::Min).unwrap();
        let second = AbstractionStep::new("b", [pi("a"), pi("h3")]).unwrap();
        let twice = once.merge_columns(&second, Aggregation::Min).unwrap();

        assert_eq!(twice.origin(), &t);
        assert_eq!(twice.history().len(), 2);
        assert_eq!(twice.concrete_origin(), t);
        assert!(!twice.concrete_origin().is_abstracted());
    }

    #[test]
    fn test_merge_unknown_neuron() {
        let step = AbstractionStep::new("a", [pi("h1"), pi("nope")]).unwrap();
        let err = table().merge_columns(&step, Aggregation::Max).unwrap_err();
        assert!(matches!(err, ArnnError::UnknownNeuron(_)));
    }

    #[test]
    fn test_merge_name_collision() {
        let step = AbstractionStep::new("h3", [pi("h1"), pi("h2")]).unwrap();
        let err = table().merge_columns(&step, Aggregation::Max).unwrap_err();
        assert!(matches!(err, ArnnError::InvalidAbstractionStep(_)));
    }

    #[test]
    fn test_bias_table() {
        let b = BiasTable::new(vec![pi("h1"), pi("h2")], vec![1.0, -1.0]).unwrap();
        assert_eq!(b.get(&pi("h2")), Some(-1.0));
        assert_eq!(b.as_table().srcs(), &[NeuronId::unit()]);

        let step = AbstractionStep::new("a", [pi("h1"), pi("h2")]).unwrap();
        let merged = b.merge(&step, Aggregation::Max).unwrap();
        assert_eq!(merged.ids(), &[pi("a")]);
        assert_eq!(merged.get(&pi("a")), Some(1.0));
    }

    #[test]
    fn test_bias_from_table_requires_unit_row() {
        let err = BiasTable::from_table(table()).unwrap_err();
        assert!(matches!(err, ArnnError::Structural(_)));
    }

    #[test]
    fn test_aggregation_for_scaling() {
        assert_eq!(Aggregation::for_scaling(Some(Scaling::Inc)), Aggregation::Max);
        assert_eq!(Aggregation::for_scaling(Some(Scaling::Dec)), Aggregation::Min);
        assert_eq!(Aggregation::Sum.apply([1.0, 2.0, 3.0]), 6.0);
        assert_eq!(Aggregation::Min.apply([1.0, -2.0]), -2.0);
    }
}
