//! Bridge particle filter.
//!
//! A particle filter with a bridge weighting function: between observations
//! the model supplies lookahead ("bridge") log-densities that steer
//! particles toward the next observation. Bridge weights are rolling — each
//! bridge step replaces the previous increment rather than compounding with
//! it — so on arrival at the observation the outstanding bridge contribution
//! cancels exactly and the true observation likelihood takes its place.
//!
//! One invocation walks a [`Schedule`] forward, interleaving bridging,
//! resampling, prediction, and correction, and returns the accumulated
//! estimate of the marginal log-likelihood.

use nalgebra::DMatrix;

use crate::backend::{Backend, HostBackend};
use crate::common::{Ensemble, FilterRng};
use crate::filter::errors::FilterError;
use crate::filter::traits::{Model, OutputSink};
use crate::resampler::StratifiedResampler;
use crate::schedule::{Schedule, ScheduleIter, ScheduleNode};

/// Particle filter with bridge-weighted lookahead.
///
/// Generic over the [`Backend`] shared with its resampler. The model, RNG,
/// and output sink are borrowed per invocation; the filter owns only its
/// resampler.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeFilter<B: Backend = HostBackend> {
    resampler: StratifiedResampler<B>,
}

impl<B: Backend> BridgeFilter<B> {
    /// Create a filter around a resampler.
    pub fn new(resampler: StratifiedResampler<B>) -> Self {
        Self { resampler }
    }

    /// The resampler this filter runs.
    pub fn resampler(&self) -> &StratifiedResampler<B> {
        &self.resampler
    }

    /// Run the filter over a schedule.
    ///
    /// Returns the estimate of the marginal log-likelihood: the sum of the
    /// initial correction, per-step bridge increments, and per-step
    /// correction increments. On [`FilterError::Degenerated`] the partial
    /// estimate is discarded.
    pub fn filter<R, M, O>(
        &self,
        rng: &mut R,
        schedule: &Schedule,
        model: &M,
        ensemble: &mut Ensemble,
        out: &mut O,
    ) -> Result<f64, FilterError>
    where
        R: FilterRng,
        M: Model,
        O: OutputSink,
    {
        self.run(rng, schedule, model, ensemble, None, out)
    }

    /// Run the filter conditioned on a reference path.
    ///
    /// `reference` has one row per state coordinate and one column per
    /// output node. Ensemble row 0 is overwritten with the matching
    /// reference column at initialisation and at every output node after
    /// prediction, and resampling pins particle 0 to ancestor 0, which
    /// anchors particle 0 to the reference trajectory for conditional SMC
    /// and particle-MCMC consumers.
    pub fn filter_conditional<R, M, O>(
        &self,
        rng: &mut R,
        schedule: &Schedule,
        model: &M,
        ensemble: &mut Ensemble,
        reference: &DMatrix<f64>,
        out: &mut O,
    ) -> Result<f64, FilterError>
    where
        R: FilterRng,
        M: Model,
        O: OutputSink,
    {
        if reference.nrows() != ensemble.state_dim() {
            return Err(FilterError::size_mismatch(
                "reference path rows",
                ensemble.state_dim(),
                reference.nrows(),
            ));
        }
        if reference.ncols() < schedule.num_outputs().max(1) {
            return Err(FilterError::size_mismatch(
                "reference path columns",
                schedule.num_outputs().max(1),
                reference.ncols(),
            ));
        }
        self.run(rng, schedule, model, ensemble, Some(reference), out)
    }

    fn run<R, M, O>(
        &self,
        rng: &mut R,
        schedule: &Schedule,
        model: &M,
        ensemble: &mut Ensemble,
        reference: Option<&DMatrix<f64>>,
        out: &mut O,
    ) -> Result<f64, FilterError>
    where
        R: FilterRng,
        M: Model,
        O: OutputSink,
    {
        let p = ensemble.num_particles();
        if p == 0 {
            return Err(FilterError::size_mismatch("particles", 1, 0));
        }

        log::debug!(
            "bridge filter: P={}, nodes={}, observations={}, conditional={}",
            p,
            schedule.len(),
            schedule.num_obs(),
            reference.is_some()
        );

        let mut lws = vec![0.0; p];
        let mut blws = vec![0.0; p];
        let mut ancestors: Vec<usize> = (0..p).collect();

        let mut iter = schedule.iter();
        model.init(rng, iter.current(), ensemble);
        if let Some(x) = reference {
            pin_row0(ensemble, x, 0);
        }
        out.output0(ensemble);

        let mut ll = self.correct(iter.current(), model, ensemble, &mut lws, &mut blws);
        out.output(iter.current(), ensemble, false, &lws, &ancestors);

        while !iter.at_last() {
            ll += self.step(
                rng,
                &mut iter,
                schedule,
                model,
                ensemble,
                reference,
                &mut lws,
                &mut blws,
                &mut ancestors,
                out,
            )?;
        }

        out.output_term(ll);
        Ok(ll)
    }

    /// Bridge, resample, predict, and correct until the next observed node
    /// or the end of the schedule.
    #[allow(clippy::too_many_arguments)]
    fn step<R, M, O>(
        &self,
        rng: &mut R,
        iter: &mut ScheduleIter<'_>,
        schedule: &Schedule,
        model: &M,
        ensemble: &mut Ensemble,
        reference: Option<&DMatrix<f64>>,
        lws: &mut [f64],
        blws: &mut [f64],
        ancestors: &mut [usize],
        out: &mut O,
    ) -> Result<f64, FilterError>
    where
        R: FilterRng,
        M: Model,
        O: OutputSink,
    {
        let mut ll = 0.0;
        loop {
            ll += self.bridge(iter.current(), schedule.num_obs(), model, ensemble, lws, blws);
            let resampled = self.resample(rng, reference.is_some(), lws, blws, ancestors, ensemble)?;

            iter.advance();
            model.predict(rng, iter.current(), ensemble);
            if let Some(x) = reference {
                if iter.current().has_output {
                    pin_row0(ensemble, x, iter.current().index_output);
                }
            }

            ll += self.correct(iter.current(), model, ensemble, lws, blws);
            out.output(iter.current(), ensemble, resampled, lws, ancestors);

            if iter.at_last() || iter.current().is_observed {
                break;
            }
        }
        Ok(ll)
    }

    /// Update particle weights using the bridge lookahead.
    ///
    /// Replaces the previous bridge increment: the prior contribution is
    /// subtracted from the weights, fresh bridge log-densities are computed
    /// against the next observation's mask, and the result is added back.
    ///
    /// # Returns
    /// Normalising constant contribution, `logsumexp(lws) − ln P`.
    fn bridge<M: Model>(
        &self,
        node: &ScheduleNode,
        num_obs: usize,
        model: &M,
        ensemble: &Ensemble,
        lws: &mut [f64],
        blws: &mut [f64],
    ) -> f64 {
        debug_assert_eq!(lws.len(), blws.len());

        if node.has_bridge && !node.is_observed && node.index_obs < num_obs {
            for (lw, b) in lws.iter_mut().zip(blws.iter()) {
                *lw -= b;
            }
            blws.fill(0.0);

            model.bridge_log_densities(ensemble, model.observation_mask(node.index_obs), blws);

            for (lw, b) in lws.iter_mut().zip(blws.iter()) {
                *lw += b;
            }
            B::logsumexp(lws) - (lws.len() as f64).ln()
        } else {
            0.0
        }
    }

    /// Correct against the observation at an observed node.
    ///
    /// The outstanding bridge contribution is cancelled first, so the true
    /// observation likelihood substitutes the lookahead. Returns
    /// `logsumexp(lws') − logsumexp(lws)` around the observation update,
    /// zero at unobserved nodes.
    fn correct<M: Model>(
        &self,
        node: &ScheduleNode,
        model: &M,
        ensemble: &Ensemble,
        lws: &mut [f64],
        blws: &mut [f64],
    ) -> f64 {
        if !node.is_observed {
            return 0.0;
        }

        for (lw, b) in lws.iter_mut().zip(blws.iter()) {
            *lw -= b;
        }
        blws.fill(0.0);

        let before = B::logsumexp(lws);
        model.observation_log_densities(
            node,
            ensemble,
            model.observation_mask(node.index_obs),
            lws,
        );
        let after = B::logsumexp(lws);
        after - before
    }

    /// Apply the resampler's decision rule; a resample also clears the
    /// rolling bridge weights.
    fn resample<R: FilterRng>(
        &self,
        rng: &mut R,
        conditional: bool,
        lws: &mut [f64],
        blws: &mut [f64],
        ancestors: &mut [usize],
        ensemble: &mut Ensemble,
    ) -> Result<bool, FilterError> {
        let resampled = if conditional {
            self.resampler
                .resample_conditional(rng, lws, ancestors, ensemble.matrix_mut())?
        } else {
            self.resampler
                .resample(rng, lws, ancestors, ensemble.matrix_mut())?
        };
        if resampled {
            blws.fill(0.0);
        }
        Ok(resampled)
    }
}

/// Overwrite ensemble row 0 with a column of the reference path.
fn pin_row0(ensemble: &mut Ensemble, reference: &DMatrix<f64>, col: usize) {
    let x = ensemble.matrix_mut();
    for d in 0..x.ncols() {
        x[(0, d)] = reference[(d, col)];
    }
}
