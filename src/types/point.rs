//! Evaluated readings and the aggregated per-message result shape

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Status;

/// One classified reading, handed to the point sink and to the result aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedPoint {
    /// Sensor display name (`pH`, `TDS`, `Temperature`, ...), used as the `sensor` tag
    pub sensor_name: String,
    pub value: f64,
    pub unit: String,
    pub status: Status,
    pub timestamp: DateTime<Utc>,
}

/// Entry of the ordered result list returned for one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorResult {
    pub sensor: String,
    pub value: f64,
    pub unit: String,
    pub status: String,
    pub color: String,
}

impl From<&EvaluatedPoint> for SensorResult {
    fn from(point: &EvaluatedPoint) -> Self {
        Self {
            sensor: point.sensor_name.clone(),
            value: point.value,
            unit: point.unit.clone(),
            status: point.status.label().to_string(),
            color: point.status.color().to_string(),
        }
    }
}
