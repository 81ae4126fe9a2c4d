//! Monitor Configuration - broker, time-series sink, HTTP and sensor settings
//!
//! Every struct implements `Default` with the values of the reference
//! deployment (local Mosquitto broker, local InfluxDB 2.x), so the service runs
//! unchanged when no config file is present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming a TOML config file
pub const CONFIG_ENV_VAR: &str = "SIMOKA_CONFIG";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "simoka.toml";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config parse error ({}): {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of the ingestion service.
///
/// Load with [`MonitorConfig::load`], which searches:
/// 1. an explicit path (`--config`)
/// 2. `$SIMOKA_CONFIG`
/// 3. `./simoka.toml`
/// 4. built-in defaults
///
/// and then applies `SIMOKA_*` environment overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Publish/subscribe channel carrying sensor payloads
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Time-series sink
    #[serde(default)]
    pub influx: InfluxConfig,

    /// Read-only status API
    #[serde(default)]
    pub server: ServerConfig,

    /// Optional sensor kinds
    #[serde(default)]
    pub sensors: SensorsConfig,
}

impl MonitorConfig {
    /// Load configuration using the standard search order.
    ///
    /// An explicit path that cannot be loaded is an error. A broken
    /// `$SIMOKA_CONFIG` or `./simoka.toml` is logged and skipped.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => {
                let config = Self::load_from_file(path)?;
                info!(path = %path.display(), "Loaded config from --config");
                config
            }
            None => Self::search(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn search() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load and validate a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply deployment overrides. `lookup` is `std::env::var` in production.
    ///
    /// - `SIMOKA_MQTT_HOST`, `SIMOKA_MQTT_PORT`
    /// - `SIMOKA_INFLUX_URL`, `SIMOKA_INFLUX_TOKEN`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SIMOKA_MQTT_HOST").filter(|v| !v.is_empty()) {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("SIMOKA_MQTT_PORT") {
            match port.parse() {
                Ok(p) => self.mqtt.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid SIMOKA_MQTT_PORT"),
            }
        }
        if let Some(url) = lookup("SIMOKA_INFLUX_URL").filter(|v| !v.is_empty()) {
            self.influx.url = url;
        }
        if let Some(token) = lookup("SIMOKA_INFLUX_TOKEN").filter(|v| !v.is_empty()) {
            self.influx.token = token;
        }
    }

    /// Check all sections for internal consistency.
    ///
    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let m = &self.mqtt;
        if m.host.trim().is_empty() {
            errors.push("mqtt.host must not be empty".to_string());
        }
        if m.port == 0 {
            errors.push("mqtt.port must be non-zero".to_string());
        }
        if m.client_id.trim().is_empty() {
            errors.push("mqtt.client_id must not be empty".to_string());
        }
        if m.topic.is_empty() {
            errors.push("mqtt.topic must not be empty".to_string());
        } else if m.topic.contains(['+', '#']) {
            errors.push(format!(
                "mqtt.topic ({}) must be an exact topic, wildcards are not allowed",
                m.topic
            ));
        }
        if m.keep_alive_secs < 5 {
            errors.push(format!(
                "mqtt.keep_alive_secs ({}) must be at least 5",
                m.keep_alive_secs
            ));
        }
        if m.max_connect_attempts == 0 {
            errors.push("mqtt.max_connect_attempts must be at least 1".to_string());
        }
        if m.initial_backoff_ms == 0 {
            errors.push("mqtt.initial_backoff_ms must be non-zero".to_string());
        }
        if m.max_backoff_ms < m.initial_backoff_ms {
            errors.push(format!(
                "mqtt.max_backoff_ms ({}) must be >= initial_backoff_ms ({})",
                m.max_backoff_ms, m.initial_backoff_ms
            ));
        }
        if !(1024..=defaults::MQTT_PROTOCOL_MAX_PACKET_SIZE).contains(&m.max_packet_size_bytes) {
            errors.push(format!(
                "mqtt.max_packet_size_bytes ({}) must be between 1024 and {}",
                m.max_packet_size_bytes,
                defaults::MQTT_PROTOCOL_MAX_PACKET_SIZE
            ));
        }

        let i = &self.influx;
        if !(i.url.starts_with("http://") || i.url.starts_with("https://")) {
            errors.push(format!("influx.url ({}) must start with http:// or https://", i.url));
        }
        if i.measurement.trim().is_empty() {
            errors.push("influx.measurement must not be empty".to_string());
        }
        if i.enabled && (i.org.is_empty() || i.bucket.is_empty()) {
            errors.push("influx.org and influx.bucket must be set when influx is enabled".to_string());
        }
        if i.batch_size == 0 {
            errors.push("influx.batch_size must be at least 1".to_string());
        }
        if i.queue_capacity < i.batch_size {
            errors.push(format!(
                "influx.queue_capacity ({}) must be >= batch_size ({})",
                i.queue_capacity, i.batch_size
            ));
        }
        if i.flush_interval_ms == 0 {
            errors.push("influx.flush_interval_ms must be non-zero".to_string());
        }
        if i.timeout_secs == 0 {
            errors.push("influx.timeout_secs must be non-zero".to_string());
        }

        if self.server.enabled && self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "server.addr ({}) is not a valid socket address",
                self.server.addr
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// MQTT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Exact topic carrying sensor payloads
    pub topic: String,
    pub keep_alive_secs: u64,
    /// Connection attempts at startup before giving up
    pub max_connect_attempts: u32,
    /// First retry delay, doubled per attempt up to `max_backoff_ms`
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Packet size limit. An oversized publish costs a reconnect, not just
    /// the message, so keep this well above the largest expected payload.
    pub max_packet_size_bytes: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "simoka-ingest".to_string(),
            topic: defaults::WATER_QUALITY_TOPIC.to_string(),
            keep_alive_secs: 30,
            max_connect_attempts: 10,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_packet_size_bytes: defaults::MQTT_MAX_PACKET_SIZE,
        }
    }
}

// ============================================================================
// InfluxDB
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    /// When false, points go to an in-memory sink (dry run)
    pub enabled: bool,
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub measurement: String,
    /// Lines per write request
    pub batch_size: usize,
    /// Upper bound on how long a queued line waits before being flushed
    pub flush_interval_ms: u64,
    /// Lines buffered between the pipeline and the flusher; overflow is dropped
    pub queue_capacity: usize,
    /// HTTP request timeout
    pub timeout_secs: u64,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:8086".to_string(),
            org: "water-org".to_string(),
            bucket: "water-data".to_string(),
            token: "water-token".to_string(),
            measurement: defaults::MEASUREMENT.to_string(),
            batch_size: 100,
            flush_interval_ms: 1_000,
            queue_capacity: 4_096,
            timeout_secs: 10,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    /// Bind address, overridden by `--addr`
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:5000".to_string(),
        }
    }
}

// ============================================================================
// Sensors
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    /// Register the total suspended solids sensor after the standard three
    pub include_tss: bool,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_validates() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: MonitorConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.mqtt.topic, "water/quality");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.influx.measurement, "water_quality");
        assert_eq!(config.influx.bucket, "water-data");
        assert!(!config.sensors.include_tss);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[mqtt]
host = "broker.lan"

[influx]
batch_size = 10
"#;
        let config: MonitorConfig = toml::from_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.influx.batch_size, 10);
        // Non-overridden values retain defaults
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.influx.queue_capacity, 4_096);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = MonitorConfig::default();
        config.mqtt.topic = "water/#".to_string();
        config.mqtt.max_backoff_ms = 10;
        config.influx.url = "localhost:8086".to_string();
        config.influx.batch_size = 0;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("wildcards")));
                assert!(errors.iter().any(|e| e.contains("max_backoff_ms")));
                assert!(errors.iter().any(|e| e.contains("influx.url")));
                assert!(errors.iter().any(|e| e.contains("batch_size")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_packet_size_limit() {
        let mut config = MonitorConfig::default();
        assert_eq!(config.mqtt.max_packet_size_bytes, 1024 * 1024);

        config.mqtt.max_packet_size_bytes = 512;
        assert!(config.validate().is_err());
        config.mqtt.max_packet_size_bytes = defaults::MQTT_PROTOCOL_MAX_PACKET_SIZE + 1;
        assert!(config.validate().is_err());
        config.mqtt.max_packet_size_bytes = 4 * 1024 * 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disabled_server_skips_addr_check() {
        let mut config = MonitorConfig::default();
        config.server.addr = "not-an-address".to_string();
        assert!(config.validate().is_err());
        config.server.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SIMOKA_MQTT_HOST", "mqtt.internal"),
            ("SIMOKA_MQTT_PORT", "8883"),
            ("SIMOKA_INFLUX_TOKEN", "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = MonitorConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.mqtt.host, "mqtt.internal");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.influx.token, "secret");
        assert_eq!(config.influx.url, "http://localhost:8086");
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut config = MonitorConfig::default();
        config.apply_env_overrides(|k| (k == "SIMOKA_MQTT_PORT").then(|| "abc".to_string()));
        assert_eq!(config.mqtt.port, 1883);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = MonitorConfig::default();
        config.sensors.include_tss = true;
        let text = config.to_toml().unwrap();
        let parsed: MonitorConfig = toml::from_str(&text).unwrap();
        assert!(parsed.sensors.include_tss);
        assert_eq!(parsed.influx.org, config.influx.org);
    }
}
