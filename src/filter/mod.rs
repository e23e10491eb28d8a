//! The bridge particle filter and its collaborator contracts.

pub mod bridge;
pub mod errors;
pub mod traits;

pub use bridge::BridgeFilter;
pub use errors::FilterError;
pub use traits::{MemoryOutput, Model, NullOutput, OutputSink, OutputStep};
