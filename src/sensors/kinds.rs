//! Built-in water quality sensor kinds

use super::{SafeRange, WaterSensor};

/// Acidity / alkalinity, payload field `ph`
#[derive(Debug, Clone, Copy, Default)]
pub struct PhSensor;

impl WaterSensor for PhSensor {
    fn name(&self) -> &str {
        "pH"
    }

    fn field(&self) -> &str {
        "ph"
    }

    fn unit(&self) -> &str {
        "pH"
    }

    fn safe_range(&self) -> SafeRange {
        SafeRange::new(6.5, 8.5)
    }
}

/// Total dissolved solids, payload field `tds`
#[derive(Debug, Clone, Copy, Default)]
pub struct TdsSensor;

impl WaterSensor for TdsSensor {
    fn name(&self) -> &str {
        "TDS"
    }

    fn field(&self) -> &str {
        "tds"
    }

    fn unit(&self) -> &str {
        "ppm"
    }

    fn safe_range(&self) -> SafeRange {
        SafeRange::new(0.0, 500.0)
    }
}

/// Water temperature, payload field `temperature`
#[derive(Debug, Clone, Copy, Default)]
pub struct TemperatureSensor;

impl WaterSensor for TemperatureSensor {
    fn name(&self) -> &str {
        "Temperature"
    }

    fn field(&self) -> &str {
        "temperature"
    }

    fn unit(&self) -> &str {
        "°C"
    }

    fn safe_range(&self) -> SafeRange {
        SafeRange::new(20.0, 35.0)
    }
}

/// Total suspended solids, payload field `tss`.
///
/// Not part of the standard registry; enabled with `sensors.include_tss`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TssSensor;

impl WaterSensor for TssSensor {
    fn name(&self) -> &str {
        "TSS"
    }

    fn field(&self) -> &str {
        "tss"
    }

    fn unit(&self) -> &str {
        "mg/L"
    }

    fn safe_range(&self) -> SafeRange {
        SafeRange::new(0.0, 50.0)
    }
}
