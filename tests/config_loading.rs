//! Config Loading Tests
//!
//! Loads `MonitorConfig` from real files on disk and checks that explicit
//! paths, partial sections and validation failures behave as documented.

use std::io::Write;

use simoka::config::{defaults, MonitorConfig};
use simoka::ConfigError;
use simoka::SensorRegistry;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn explicit_path_overrides_defaults() {
    let file = write_config(
        r#"
[mqtt]
host = "broker.plant.local"
port = 8883
client_id = "simoka-line-2"

[influx]
url = "https://influx.plant.local"
bucket = "line-2"
batch_size = 50

[sensors]
include_tss = true
"#,
    );

    let config = MonitorConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.mqtt.host, "broker.plant.local");
    assert_eq!(config.mqtt.port, 8883);
    assert_eq!(config.mqtt.topic, defaults::WATER_QUALITY_TOPIC);
    assert_eq!(config.influx.bucket, "line-2");
    assert_eq!(config.influx.org, "water-org");
    assert_eq!(config.influx.measurement, defaults::MEASUREMENT);
    assert_eq!(config.influx.batch_size, 50);
    assert_eq!(config.server.addr, "0.0.0.0:5000");

    let registry = SensorRegistry::from_config(&config.sensors);
    let names: Vec<_> = registry.list().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["pH", "TDS", "Temperature", "TSS"]);
}

#[test]
fn empty_file_yields_deployment_defaults() {
    let file = write_config("");
    let config = MonitorConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.mqtt.host, "localhost");
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.influx.url, "http://localhost:8086");
    assert_eq!(config.influx.token, "water-token");
    assert!(!config.sensors.include_tss);
}

#[test]
fn missing_explicit_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    match MonitorConfig::load(Some(path.as_path())) {
        Err(ConfigError::Io { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected I/O error, got {other:?}"),
    }
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let file = write_config("[mqtt\nhost = ");
    assert!(matches!(
        MonitorConfig::load_from_file(file.path()),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn invalid_values_are_all_reported() {
    let file = write_config(
        r#"
[mqtt]
topic = "water/#"
port = 0

[influx]
url = "localhost:8086"
batch_size = 0
"#,
    );

    match MonitorConfig::load_from_file(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("mqtt.topic")));
            assert!(errors.iter().any(|e| e.contains("mqtt.port")));
            assert!(errors.iter().any(|e| e.contains("influx.url")));
            assert!(errors.iter().any(|e| e.contains("influx.batch_size")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn serialized_config_loads_back() {
    let mut config = MonitorConfig::default();
    config.mqtt.client_id = "roundtrip".to_string();
    config.server.enabled = false;

    let file = write_config(&config.to_toml().unwrap());
    let loaded = MonitorConfig::load_from_file(file.path()).unwrap();

    assert_eq!(loaded.mqtt.client_id, "roundtrip");
    assert!(!loaded.server.enabled);
}
