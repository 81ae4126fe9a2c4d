//! Service Configuration Module
//!
//! Configuration is loaded from TOML once at startup and passed explicitly to
//! each component (subscriber, writer, pipeline, API). There is no global
//! config handle.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` CLI flag
//! 2. `SIMOKA_CONFIG` environment variable (path to TOML file)
//! 3. `simoka.toml` in the current working directory
//! 4. Built-in defaults
//!
//! `SIMOKA_MQTT_HOST`, `SIMOKA_MQTT_PORT`, `SIMOKA_INFLUX_URL` and
//! `SIMOKA_INFLUX_TOKEN` override the loaded values.

mod monitor_config;
pub mod defaults;

pub use monitor_config::*;
