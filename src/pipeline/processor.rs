//! Per-message ingestion state machine
//!
//! ```text
//! Idle → ParsingPayload → Evaluating → Completed
//! Idle → ParsingPayload → ParseFailed
//! ```
//!
//! Each stage is contained: a bad sensor field drops that sensor, a bad
//! payload drops that message, nothing escapes to the caller as an error.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::defaults::MAX_LOGGED_PAYLOAD_BYTES;
use crate::sensors::{ExtractionError, SensorRegistry};
use crate::storage::PointSink;
use crate::types::{evaluate, EvaluatedPoint, SensorResult};

/// Malformed message body
#[derive(Debug, Error)]
pub enum PayloadParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Payload is a JSON {found}, expected an object")]
    NotAnObject { found: &'static str },
}

/// Pipeline stage, used for transition logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionState {
    Idle,
    ParsingPayload,
    Evaluating,
    Completed,
    ParseFailed,
}

/// A sensor left out of the result set for one message
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSensor {
    pub sensor: String,
    pub error: ExtractionError,
}

/// Terminal state of one message
#[derive(Debug)]
pub enum MessageOutcome {
    /// Evaluated; `results` in registry order, possibly fewer than the registry
    Completed {
        results: Vec<SensorResult>,
        skipped: Vec<SkippedSensor>,
    },
    /// Discarded; zero evaluations, zero writes
    ParseFailed(PayloadParseError),
}

impl MessageOutcome {
    /// Aggregated results, empty on parse failure
    pub fn results(&self) -> &[SensorResult] {
        match self {
            Self::Completed { results, .. } => results,
            Self::ParseFailed(_) => &[],
        }
    }

    pub fn is_parse_failure(&self) -> bool {
        matches!(self, Self::ParseFailed(_))
    }
}

/// Sensor registry plus point sink, both injected at construction
pub struct IngestionPipeline {
    registry: Arc<SensorRegistry>,
    sink: Arc<dyn PointSink>,
}

impl IngestionPipeline {
    pub fn new(registry: Arc<SensorRegistry>, sink: Arc<dyn PointSink>) -> Self {
        Self { registry, sink }
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn PointSink> {
        &self.sink
    }

    /// Run one raw message body through the state machine.
    pub fn process(&self, payload: &[u8]) -> MessageOutcome {
        transition(IngestionState::Idle, IngestionState::ParsingPayload);

        let fields = match parse_payload(payload) {
            Ok(fields) => fields,
            Err(e) => {
                transition(IngestionState::ParsingPayload, IngestionState::ParseFailed);
                warn!(
                    error = %e,
                    payload = %lossy_preview(payload),
                    "Discarding malformed payload"
                );
                return MessageOutcome::ParseFailed(e);
            }
        };

        transition(IngestionState::ParsingPayload, IngestionState::Evaluating);
        let (results, skipped) = self.evaluate_fields(&fields);

        transition(IngestionState::Evaluating, IngestionState::Completed);
        info!(
            evaluated = results.len(),
            skipped = skipped.len(),
            results = %format_results(&results),
            "Message processed"
        );

        MessageOutcome::Completed { results, skipped }
    }

    /// Extract, evaluate and write every registered sensor, in registry order.
    fn evaluate_fields(&self, fields: &Map<String, Value>) -> (Vec<SensorResult>, Vec<SkippedSensor>) {
        let timestamp = Utc::now();
        let mut results = Vec::with_capacity(self.registry.len());
        let mut skipped = Vec::new();

        for sensor in self.registry.iter() {
            let value = match sensor.extract(fields) {
                Ok(v) => v,
                Err(error) => {
                    warn!(sensor = %sensor.name(), error = %error, "Sensor excluded from message");
                    skipped.push(SkippedSensor {
                        sensor: sensor.name().to_string(),
                        error,
                    });
                    continue;
                }
            };

            let point = EvaluatedPoint {
                sensor_name: sensor.name().to_string(),
                value,
                unit: sensor.unit().to_string(),
                status: evaluate(value, &sensor.safe_range()),
                timestamp,
            };

            self.sink.write(&point);
            results.push(SensorResult::from(&point));
        }

        (results, skipped)
    }
}

/// Decode the body as a JSON object
pub fn parse_payload(payload: &[u8]) -> Result<Map<String, Value>, PayloadParseError> {
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(map) => Ok(map),
        other => Err(PayloadParseError::NotAnObject {
            found: json_type_name(&other),
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn transition(from: IngestionState, to: IngestionState) {
    debug!(from = ?from, to = ?to, "Ingestion state");
}

/// Raw payload for diagnostics, lossy UTF-8, truncated on a char boundary
fn lossy_preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    if text.len() <= MAX_LOGGED_PAYLOAD_BYTES {
        return text.into_owned();
    }
    let mut end = MAX_LOGGED_PAYLOAD_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn format_results(results: &[SensorResult]) -> String {
    results
        .iter()
        .map(|r| format!("{}={}{} {}", r.sensor, r.value, r.unit, r.status))
        .collect::<Vec<_>>()
        .join(", ")
}
