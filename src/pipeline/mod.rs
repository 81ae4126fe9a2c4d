//! Ingestion Pipeline
//!
//! ```text
//! source ─► ProcessingLoop ─► IngestionPipeline ─► for each sensor:
//!                                                    extract → evaluate → sink.write → result
//! ```
//!
//! The pipeline holds no state between messages. Counters and the most recent
//! result list are published into [`AppState`] by the processing loop.

mod state;
mod processor;
pub mod source;
pub mod processing_loop;

pub use state::*;
pub use processor::{
    parse_payload, IngestionPipeline, IngestionState, MessageOutcome, PayloadParseError,
    SkippedSensor,
};
pub use processing_loop::ProcessingLoop;
pub use source::{MessageEvent, MessageSource, MqttSource, ReplaySource, StdinSource};
