//! Error types for the resampler and filter
//!
//! This module provides proper error handling instead of panics.

use std::fmt;

/// Errors that can occur during resampling and filtering
#[derive(Debug, Clone)]
pub enum FilterError {
    /// Total particle weight is zero: every log-weight is non-finite.
    ///
    /// Fatal for the invocation; no partial state is returned.
    Degenerated,

    /// Schedule rejected at entry (empty, or times non-monotonic)
    InvalidSchedule {
        /// Description of the schedule defect
        description: String,
    },

    /// Size mismatch between weight vectors, ancestry, and the ensemble
    Precondition {
        /// What was expected
        expected: usize,
        /// What was received
        actual: usize,
        /// Context (e.g., "log-weights", "ancestry")
        context: String,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::Degenerated => {
                write!(f, "Particle filter degenerated: total weight is zero")
            }
            FilterError::InvalidSchedule { description } => {
                write!(f, "Invalid schedule: {}", description)
            }
            FilterError::Precondition {
                expected,
                actual,
                context,
            } => {
                write!(
                    f,
                    "Size mismatch for {}: expected {}, got {}",
                    context, expected, actual
                )
            }
        }
    }
}

impl std::error::Error for FilterError {}

impl FilterError {
    /// Build a precondition error for a mismatched vector length.
    pub(crate) fn size_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        FilterError::Precondition {
            expected,
            actual,
            context: context.to_string(),
        }
    }
}
