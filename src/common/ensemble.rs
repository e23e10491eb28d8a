//! Particle ensemble storage.

use nalgebra::DMatrix;

/// Ordered collection of P particles over a D-dimensional state.
///
/// Storage is a P×D matrix whose rows are particles. The particle count is
/// fixed for the duration of a single filter invocation; the filter mutates
/// rows through prediction, the conditional reference write, and the
/// in-place ancestry copy, in that order within a step.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    x: DMatrix<f64>,
}

impl Ensemble {
    /// Create a zero-initialised ensemble of `num_particles` particles with
    /// `state_dim` state coordinates each.
    pub fn zeros(num_particles: usize, state_dim: usize) -> Self {
        Self {
            x: DMatrix::zeros(num_particles, state_dim),
        }
    }

    /// Wrap an existing P×D state matrix.
    pub fn from_matrix(x: DMatrix<f64>) -> Self {
        Self { x }
    }

    /// Number of particles (rows).
    #[inline]
    pub fn num_particles(&self) -> usize {
        self.x.nrows()
    }

    /// State dimension (columns).
    #[inline]
    pub fn state_dim(&self) -> usize {
        self.x.ncols()
    }

    /// The underlying P×D state matrix.
    #[inline]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.x
    }

    /// Mutable access to the underlying P×D state matrix.
    #[inline]
    pub fn matrix_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.x
    }

    /// State vector of particle `i` as an owned copy.
    pub fn particle(&self, i: usize) -> Vec<f64> {
        self.x.row(i).iter().copied().collect()
    }

    /// Overwrite the state of particle `i`.
    pub fn set_particle(&mut self, i: usize, state: &[f64]) {
        debug_assert_eq!(state.len(), self.state_dim());
        for (d, &v) in state.iter().enumerate() {
            self.x[(i, d)] = v;
        }
    }
}
