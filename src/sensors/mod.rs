//! Sensor Registry
//!
//! Declares the known water quality sensor kinds. Each kind implements
//! [`WaterSensor`]: a payload field to read, a display unit and a safe range.
//! The evaluator and the point sink only see the trait, so adding a sensor kind
//! means adding one implementation and registering it.
//!
//! Registration order is the output order of every per-message result list.

mod kinds;

pub use kinds::{PhSensor, TdsSensor, TemperatureSensor, TssSensor};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::SensorsConfig;

// ============================================================================
// Error Types
// ============================================================================

/// Failure to read one sensor's value out of a payload.
///
/// Contained per sensor: the sensor is left out of the message's result list
/// and the remaining sensors are still evaluated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("field '{field}' is missing")]
    Missing { field: String },

    #[error("field '{field}' is not numeric: {found}")]
    NotNumeric { field: String, found: String },
}

// ============================================================================
// Sensor Contract
// ============================================================================

/// Inclusive `[min, max]` interval considered non-hazardous
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeRange {
    pub min: f64,
    pub max: f64,
}

impl SafeRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Midpoint of the range
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Read-only description of a registered sensor kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDefinition {
    pub name: String,
    pub field: String,
    pub unit: String,
    pub safe_range: SafeRange,
}

/// Capability set of one sensor kind.
///
/// Implementations are immutable and shared across message handlers.
pub trait WaterSensor: Send + Sync + 'static {
    /// Display name, also the `sensor` tag of persisted points (e.g. `pH`)
    fn name(&self) -> &str;

    /// Exact payload field holding this sensor's value (e.g. `ph`)
    fn field(&self) -> &str;

    /// Display unit (e.g. `ppm`)
    fn unit(&self) -> &str;

    fn safe_range(&self) -> SafeRange;

    /// Read this sensor's value from a decoded payload.
    ///
    /// The default reads [`field`](WaterSensor::field) with
    /// [`read_numeric_field`]; override for kinds that derive their value.
    fn extract(&self, payload: &Map<String, Value>) -> Result<f64, ExtractionError> {
        read_numeric_field(payload, self.field())
    }

    fn definition(&self) -> SensorDefinition {
        SensorDefinition {
            name: self.name().to_string(),
            field: self.field().to_string(),
            unit: self.unit().to_string(),
            safe_range: self.safe_range(),
        }
    }
}

/// Read a finite number from `payload[field]`.
///
/// Accepts JSON numbers and strings holding a decimal number (devices publish
/// fixed-precision strings such as `"7.21"`). Absent or `null` fields are
/// `Missing`; every other type, non-finite strings like `"NaN"` and numbers
/// that overflow `f64` (`1e400`) are `NotNumeric`.
pub fn read_numeric_field(
    payload: &Map<String, Value>,
    field: &str,
) -> Result<f64, ExtractionError> {
    let not_numeric = |found: String| ExtractionError::NotNumeric {
        field: field.to_string(),
        found,
    };

    match payload.get(field) {
        None | Some(Value::Null) => Err(ExtractionError::Missing {
            field: field.to_string(),
        }),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| not_numeric(n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| not_numeric(format!("{s:?}"))),
        Some(other) => Err(not_numeric(other.to_string())),
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Ordered, process-wide set of sensor kinds.
///
/// Built once at startup and shared read-only (`Arc<SensorRegistry>`).
pub struct SensorRegistry {
    sensors: Vec<Box<dyn WaterSensor>>,
}

impl SensorRegistry {
    /// Empty registry; add kinds with [`with_sensor`](Self::with_sensor)
    pub fn empty() -> Self {
        Self {
            sensors: Vec::new(),
        }
    }

    /// pH, TDS, Temperature, in that order
    pub fn standard() -> Self {
        Self::empty()
            .with_sensor(PhSensor)
            .with_sensor(TdsSensor)
            .with_sensor(TemperatureSensor)
    }

    /// Registry described by the `[sensors]` config section
    pub fn from_config(config: &SensorsConfig) -> Self {
        let registry = Self::standard();
        if config.include_tss {
            registry.with_sensor(TssSensor)
        } else {
            registry
        }
    }

    /// Append a sensor kind after every kind already registered
    #[must_use]
    pub fn with_sensor<S: WaterSensor>(mut self, sensor: S) -> Self {
        self.sensors.push(Box::new(sensor));
        self
    }

    /// Sensor kinds in registration order
    pub fn iter(&self) -> impl Iterator<Item = &(dyn WaterSensor + 'static)> + '_ {
        self.sensors.iter().map(|s| s.as_ref())
    }

    /// Definitions in registration order
    pub fn list(&self) -> Vec<SensorDefinition> {
        self.iter().map(|s| s.definition()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn WaterSensor> {
        self.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for SensorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|s| s.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_standard_registration_order() {
        let names: Vec<_> = SensorRegistry::standard()
            .list()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["pH", "TDS", "Temperature"]);
    }

    #[test]
    fn test_tss_is_opt_in() {
        let default = SensorRegistry::from_config(&SensorsConfig::default());
        assert_eq!(default.len(), 3);
        assert!(default.get("TSS").is_none());

        let with_tss = SensorRegistry::from_config(&SensorsConfig { include_tss: true });
        assert_eq!(with_tss.len(), 4);
        assert_eq!(with_tss.list()[3].name, "TSS");
    }

    #[test]
    fn test_field_names_are_exact() {
        let payload = object(json!({ "pH": 7.0 }));
        let err = PhSensor.extract(&payload).unwrap_err();
        assert_eq!(
            err,
            ExtractionError::Missing {
                field: "ph".to_string()
            }
        );

        let payload = object(json!({ "ph": 7.0 }));
        assert_eq!(PhSensor.extract(&payload).unwrap(), 7.0);
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let payload = object(json!({ "tds": "412", "temperature": " 27.5 " }));
        assert_eq!(TdsSensor.extract(&payload).unwrap(), 412.0);
        assert_eq!(TemperatureSensor.extract(&payload).unwrap(), 27.5);
    }

    #[test]
    fn test_non_numeric_values_are_rejected() {
        for bad in [json!("abc"), json!(""), json!("NaN"), json!("inf"), json!(true), json!([7.0]), json!({"v": 7})] {
            let payload = object(json!({ "ph": bad.clone() }));
            assert!(
                matches!(PhSensor.extract(&payload), Err(ExtractionError::NotNumeric { .. })),
                "expected NotNumeric for {bad}"
            );
        }
    }

    #[test]
    fn test_overflowing_number_is_not_numeric() {
        let payload: Map<String, Value> =
            serde_json::from_str(r#"{"tds": 1e400, "ph": -2e308}"#).unwrap();
        assert_eq!(
            TdsSensor.extract(&payload),
            Err(ExtractionError::NotNumeric {
                field: "tds".to_string(),
                found: "1e400".to_string(),
            })
        );
        assert!(matches!(
            PhSensor.extract(&payload),
            Err(ExtractionError::NotNumeric { .. })
        ));
    }

    #[test]
    fn test_null_is_missing() {
        let payload = object(json!({ "ph": null }));
        assert!(matches!(
            PhSensor.extract(&payload),
            Err(ExtractionError::Missing { .. })
        ));
    }

    #[test]
    fn test_custom_sensor_kind_plugs_in() {
        struct Turbidity;

        impl WaterSensor for Turbidity {
            fn name(&self) -> &str {
                "Turbidity"
            }
            fn field(&self) -> &str {
                "ntu"
            }
            fn unit(&self) -> &str {
                "NTU"
            }
            fn safe_range(&self) -> SafeRange {
                SafeRange::new(0.0, 5.0)
            }
        }

        let registry = SensorRegistry::standard().with_sensor(Turbidity);
        let last = registry.list().pop().unwrap();
        assert_eq!(last.name, "Turbidity");
        assert_eq!(last.safe_range, SafeRange::new(0.0, 5.0));

        let payload = object(json!({ "ntu": 1.2 }));
        assert_eq!(registry.get("Turbidity").unwrap().extract(&payload).unwrap(), 1.2);
    }

    #[test]
    fn test_safe_range_helpers() {
        let range = SafeRange::new(6.5, 8.5);
        assert_eq!(range.midpoint(), 7.5);
        assert_eq!(range.width(), 2.0);
    }
}
