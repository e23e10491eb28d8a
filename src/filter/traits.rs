//! Collaborator contracts for the bridge particle filter.
//!
//! The filter composes three external collaborators, all borrowed for the
//! duration of one invocation: a [`Model`] supplying prediction and
//! log-density evaluation, a random variate source
//! ([`crate::common::FilterRng`]), and an [`OutputSink`] receiving per-step
//! results. The filter holds only downward references; collaborator
//! lifetimes are managed by the caller.

use nalgebra::DMatrix;

use crate::common::{Ensemble, FilterRng};
use crate::mask::Mask;
use crate::schedule::ScheduleNode;

/// Probabilistic state-space model consumed by the filter.
///
/// All log-density operations write row-aligned per-particle values: entry
/// `i` of the output vector belongs to ensemble row `i`. A model signals a
/// broken particle by producing a non-finite log-density for it; particles
/// with finite weights survive, and the filter surfaces total collapse as
/// [`crate::filter::FilterError::Degenerated`] at the next resample.
pub trait Model {
    /// Number of model variables (the width of observation masks).
    fn num_vars(&self) -> usize;

    /// Draw the initial particle states at the first schedule node.
    fn init<R: FilterRng>(&self, rng: &mut R, node: &ScheduleNode, ensemble: &mut Ensemble);

    /// Propagate every particle forward to the time of `node`.
    fn predict<R: FilterRng>(&self, rng: &mut R, node: &ScheduleNode, ensemble: &mut Ensemble);

    /// Add observation log-densities at an observed node into `lws`.
    ///
    /// The mask describes which variables and coordinates carry observed
    /// values at this node.
    fn observation_log_densities(
        &self,
        node: &ScheduleNode,
        ensemble: &Ensemble,
        mask: &Mask,
        lws: &mut [f64],
    );

    /// Write bridge log-densities into `blws`, steering particles toward
    /// the observation described by `mask`.
    ///
    /// Unlike [`Model::observation_log_densities`] this overwrites rather
    /// than accumulates: the filter manages the rolling bridge sum itself.
    fn bridge_log_densities(&self, ensemble: &Ensemble, mask: &Mask, blws: &mut [f64]);

    /// Mask of observation `obs_index`.
    fn observation_mask(&self, obs_index: usize) -> &Mask;
}

/// Sink for filter output.
///
/// The filter calls these at well-defined points — initialisation, after
/// every correction, and on termination — and makes no assumption about
/// persistence.
pub trait OutputSink {
    /// Initial ensemble, before the first correction.
    fn output0(&mut self, ensemble: &Ensemble);

    /// Per-step output after correction.
    fn output(
        &mut self,
        node: &ScheduleNode,
        ensemble: &Ensemble,
        resampled: bool,
        lws: &[f64],
        ancestors: &[usize],
    );

    /// Total marginal log-likelihood, on termination.
    fn output_term(&mut self, log_likelihood: f64);
}

/// Output sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl OutputSink for NullOutput {
    fn output0(&mut self, _ensemble: &Ensemble) {}

    fn output(
        &mut self,
        _node: &ScheduleNode,
        _ensemble: &Ensemble,
        _resampled: bool,
        _lws: &[f64],
        _ancestors: &[usize],
    ) {
    }

    fn output_term(&mut self, _log_likelihood: f64) {}
}

/// One recorded filter step.
#[derive(Debug, Clone)]
pub struct OutputStep {
    /// Schedule node the step corrected against.
    pub node: ScheduleNode,
    /// Ensemble state after correction.
    pub ensemble: DMatrix<f64>,
    /// Whether the step resampled.
    pub resampled: bool,
    /// Log-weights after correction.
    pub lws: Vec<f64>,
    /// Ancestry of the step.
    pub ancestors: Vec<usize>,
}

/// Output sink that records every call, for tests and diagnostics.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    /// Ensemble state at initialisation.
    pub initial: Option<DMatrix<f64>>,
    /// Recorded steps, one per output call.
    pub steps: Vec<OutputStep>,
    /// Final marginal log-likelihood.
    pub log_likelihood: Option<f64>,
}

impl MemoryOutput {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for MemoryOutput {
    fn output0(&mut self, ensemble: &Ensemble) {
        self.initial = Some(ensemble.matrix().clone());
    }

    fn output(
        &mut self,
        node: &ScheduleNode,
        ensemble: &Ensemble,
        resampled: bool,
        lws: &[f64],
        ancestors: &[usize],
    ) {
        self.steps.push(OutputStep {
            node: *node,
            ensemble: ensemble.matrix().clone(),
            resampled,
            lws: lws.to_vec(),
            ancestors: ancestors.to_vec(),
        });
    }

    fn output_term(&mut self, log_likelihood: f64) {
        self.log_likelihood = Some(log_likelihood);
    }
}
