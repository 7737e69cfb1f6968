use crate::config::CegarConfig;
use crate::report::{named_values, CegarReport, NetworkStages, RefinementRecord};
use arnn_abstraction::{
    abstract_network, classify_output_constraints, preprocess, refine_network, refine_until_not_satisfying,
    AbstractionStrategy, RefinementContext, RefinementPolicy, RefinementStatistics,
};
use arnn_core::{ArnnError, Network, NeuronValues, Result};
use arnn_propagate::{BoundEstimator, PresolveEstimator, Presolver, PropertyUpdateMethod, UpdatePropertyHelper};
use arnn_property::{is_satisfying_assignment, prepare_network, BasicProperty, Property};
use arnn_smt::{Oracle, OracleStatus};
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// The CEGAR loop.
///
/// # Example
/// ```ignore
/// use arnn_abstraction::{CompleteAbstractionLeftToRight, RefineByMaxLoss};
/// use arnn_cegar::{Cegar, CegarConfig};
/// use arnn_smt::Z3Oracle;
///
/// let mut cegar = Cegar::new(CegarConfig::default());
/// let report = cegar.run(
///     &network,
///     &property,
///     &mut Z3Oracle::new(),
///     &mut CompleteAbstractionLeftToRight::new(),
///     &mut RefineByMaxLoss::default(),
/// )?;
/// println!("{}", report.status);
/// ```
pub struct Cegar {
    config: CegarConfig,
    presolve_estimator: Option<Box<dyn BoundEstimator>>,
}

impl Cegar {
    pub fn new(config: CegarConfig) -> Self {
        Self {
            config,
            presolve_estimator: None,
        }
    }

    /// Presolver backing [`PropertyUpdateMethod::Presolve`]. It is handed to
    /// the next [`Cegar::run`] and consumed by it.
    pub fn with_presolver<P: Presolver + 'static>(mut self, presolver: P) -> Self {
        self.presolve_estimator = Some(Box::new(PresolveEstimator::new(presolver)));
        self
    }

    pub fn config(&self) -> &CegarConfig {
        &self.config
    }

    fn property_updater(&mut self, network: &Network, property: &BasicProperty) -> Result<Option<UpdatePropertyHelper>> {
        let helper = match self.config.update_property {
            None => return Ok(None),
            Some(PropertyUpdateMethod::IntervalPropagation) => {
                UpdatePropertyHelper::interval(network.clone(), property.clone())
            }
            Some(PropertyUpdateMethod::Presolve) => {
                let estimator = self.presolve_estimator.take().ok_or_else(|| {
                    ArnnError::Config("property updates by presolve need a presolver".to_string())
                })?;
                UpdatePropertyHelper::new(network.clone(), property.clone(), estimator)
            }
        };
        Ok(Some(helper))
    }

    /// Decide `property` on `network`.
    ///
    /// The network is prepared for the property, preprocessed (unless
    /// disabled) and abstracted with `strategy`. Each iteration queries
    /// `oracle` once on the current abstract network:
    /// - `UNSAT` proves the property on the original network.
    /// - `SAT` with a witness that also holds on the original network is a
    ///   genuine counterexample.
    /// - `SAT` with a spurious witness refines the abstract network with
    ///   `policy` and continues.
    /// - Any other status ends the run as is.
    ///
    /// A witness that does not hold on the abstract network it was found for
    /// aborts the run with [`ArnnError::SpuriousWitnessInconsistency`].
    pub fn run<O, S, P>(
        &mut self,
        network: &Network,
        property: &Property,
        oracle: &mut O,
        strategy: &mut S,
        policy: &mut P,
    ) -> Result<CegarReport>
    where
        O: Oracle + ?Sized,
        S: AbstractionStrategy + ?Sized,
        P: RefinementPolicy + ?Sized,
    {
        let start = Instant::now();
        info!(network = %network.info(), "original network");

        let (prepared, property) = prepare_network(network, property)?;
        info!(network = %prepared.info(), "network prepared for property");

        let (original, original_property) = if self.config.preprocess {
            (preprocess(&prepared)?, classify_output_constraints(&property))
        } else {
            debug!("network is already classified; skipping preprocessing");
            (prepared.clone(), property)
        };

        let mut updater = self.property_updater(&original, &original_property)?;

        let mut current = abstract_network(&original, strategy)?;
        let abstracted = current.info();
        info!(network = %abstracted, "initial abstraction");

        let mut spurious_examples: Vec<NeuronValues> = Vec::new();
        let mut refinements = Vec::new();
        let mut counterexample = None;
        let mut iteration_limit_reached = false;
        let mut iterations = 0usize;

        let status = loop {
            if self.config.max_iterations.is_some_and(|max| iterations >= max) {
                warn!(iterations, "iteration limit reached");
                iteration_limit_reached = true;
                break OracleStatus::Unknown;
            }
            iterations += 1;
            let step = iterations;
            let _span = info_span!("cegar_step", step).entered();

            let query_property = match updater.as_mut() {
                Some(helper) => {
                    let updated = helper.update_property(&current)?;
                    debug!(output_constraints = ?updated.output_constraints, "updated property");
                    updated
                }
                None => original_property.clone(),
            };

            let info = current.info();
            info!(layers = ?info.layers, hidden_nodes = info.hidden_nodes, "querying oracle");
            let query_start = Instant::now();
            let outcome = oracle.check(&current, &query_property)?;
            info!(
                status = %outcome.status,
                elapsed_ms = query_start.elapsed().as_millis() as u64,
                "oracle answered"
            );

            match outcome.status {
                OracleStatus::Unsat => {
                    info!("UNSAT on the abstract network, so UNSAT on the original");
                    break OracleStatus::Unsat;
                }
                OracleStatus::Sat => {}
                other => break other,
            }

            let witness = outcome
                .assignment
                .ok_or_else(|| ArnnError::Oracle("SAT answer without an input assignment".to_string()))?;

            let (satisfies, reasons) = is_satisfying_assignment(&current, &witness, &query_property)?;
            debug!(is_satisfied = satisfies, why = ?reasons, "witness on the abstract network");
            if !satisfies {
                error!(why = ?reasons, "oracle witness does not hold on its own network");
                return Err(ArnnError::SpuriousWitnessInconsistency { reasons });
            }

            let (genuine, reasons) = is_satisfying_assignment(&original, &witness, &original_property)?;
            info!(is_satisfied = genuine, why = ?reasons, "witness on the original network");
            if genuine {
                counterexample = Some(named_values(&witness));
                break OracleStatus::Sat;
            }

            let activations = original.evaluate_all(&witness)?;
            spurious_examples.push(witness);
            let (refined, stats) = self.refine(
                &current,
                policy,
                &spurious_examples,
                &activations,
                &query_property,
                updater.as_mut(),
            )?;
            if !stats.did_refine {
                return Err(ArnnError::InvalidRefinementStep(
                    "the refinement policy left a spurious example in place without refining".to_string(),
                ));
            }
            let record = RefinementRecord::new(step, &stats, refined.info());
            info!(
                refinement_steps = record.refinement_steps,
                neurons_refined = record.neurons_refined,
                network = %record.network,
                "refinement done"
            );
            refinements.push(record);
            current = refined;
        };

        let report = CegarReport {
            status,
            iterations,
            iteration_limit_reached,
            counterexample,
            spurious_examples: spurious_examples.len(),
            refinements,
            networks: NetworkStages {
                original: network.info(),
                prepared: prepared.info(),
                preprocessed: original.info(),
                abstracted,
                last: current.info(),
            },
            elapsed: start.elapsed(),
        };
        info!(
            status = %report.status,
            iterations = report.iterations,
            spurious_examples = report.spurious_examples,
            refinement_steps = report.total_refinement_steps(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            final_network = %report.networks.last,
            "summary"
        );
        Ok(report)
    }

    fn refine<P: RefinementPolicy + ?Sized>(
        &self,
        current: &Network,
        policy: &mut P,
        spurious_examples: &[NeuronValues],
        activations: &NeuronValues,
        property: &BasicProperty,
        updater: Option<&mut UpdatePropertyHelper>,
    ) -> Result<(Network, RefinementStatistics)> {
        let mut context = RefinementContext::new(current).with_activations(activations);
        if let Some(latest) = spurious_examples.last() {
            context = context.with_spurious_example(latest);
        }
        if !self.config.refine_until_not_satisfying {
            return refine_network(&context, policy);
        }
        match updater {
            Some(helper) => {
                let mut update = |network: &Network| helper.update_property(network);
                refine_until_not_satisfying(
                    &context,
                    policy,
                    spurious_examples,
                    property,
                    Some(&mut update as &mut dyn FnMut(&Network) -> Result<BasicProperty>),
                )
            }
            None => refine_until_not_satisfying(&context, policy, spurious_examples, property, None),
        }
    }
}
