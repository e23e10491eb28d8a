//! Low-level utilities shared across the crate.

pub mod ensemble;
pub mod rng;

pub use ensemble::Ensemble;
pub use rng::FilterRng;
