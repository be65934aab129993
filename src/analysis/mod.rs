//! Analysis modules.
//!
//! Seed filtering and averaging live in the aggregator; the pipeline wires
//! them over a results directory.

pub mod aggregator;
pub mod pipeline;

pub use aggregator::*;
pub use pipeline::{build_figure_data, Aggregation, ResultsLayout};
