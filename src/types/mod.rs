//! Shared data structures for the water quality ingestion pipeline
//!
//! - `Status`: severity classification (Normal / Warning / Danger) and the evaluator
//! - `EvaluatedPoint`: one classified reading, the unit handed to the point sink
//! - `SensorResult`: one entry of the ordered per-message result list

pub mod status;
mod point;

pub use point::*;
pub use status::{evaluate, status_thresholds, Status};
