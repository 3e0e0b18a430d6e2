//! Utility types for the intake processor.

pub(crate) mod fs;
mod stats;

pub use stats::{ProcessorStats, StatsSnapshot};
