//! Re-aggregation and view filtering of per-segment suggestion measurements.
//!
//! The pipeline runs raw table → theme extraction → audience ordering →
//! aggregation → per-chart view filters. See [`data`] for the layers and
//! [`state::Session`] for the snapshot-holding entry point.

pub mod charts;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod state;

pub use error::PipelineError;
