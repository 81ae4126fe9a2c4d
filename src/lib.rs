//! SIMOKA: Water Quality Ingestion
//!
//! Subscribes to water quality readings over MQTT, classifies each sensor value
//! against its safe range and persists the classified points to InfluxDB.
//!
//! ## Architecture
//!
//! - **Sensor Registry**: ordered set of sensor kinds (pH, TDS, Temperature, optional TSS)
//! - **Status Evaluator**: pure `(value, range) -> Normal | Warning | Danger`
//! - **Time-Series Writer**: non-blocking point sink (InfluxDB line protocol or in-memory)
//! - **Ingestion Pipeline**: per-message parse, evaluate, write and aggregate

pub mod acquisition;
pub mod api;
pub mod config;
pub mod pipeline;
pub mod sensors;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, MonitorConfig};

// Re-export commonly used types
pub use types::{evaluate, EvaluatedPoint, SensorResult, Status};

// Re-export registry and sinks
pub use sensors::{ExtractionError, SafeRange, SensorDefinition, SensorRegistry, WaterSensor};
pub use storage::{InfluxWriter, MemorySink, PointSink, SinkError, WriteStatsSnapshot};

// Re-export pipeline entry points
pub use acquisition::{MqttError, MqttSubscriber};
pub use pipeline::{IngestionPipeline, MessageOutcome, PayloadParseError, ProcessingLoop};
