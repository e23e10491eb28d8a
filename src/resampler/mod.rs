//! Resampling: stratified offspring draws and ancestry algebra.
//!
//! [`StratifiedResampler`] converts a log-weight distribution into exact
//! offspring counts and a permuted ancestry; the [`ancestry`] module holds
//! the conversions between offspring, cumulative offspring, and ancestor
//! encodings, the in-place permutation, and the ensemble row copy.

pub mod ancestry;
pub mod stratified;

pub use stratified::{ResamplerConfig, StratifiedResampler};
