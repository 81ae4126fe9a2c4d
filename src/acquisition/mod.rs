//! Messaging channel acquisition
//!
//! Connects to the MQTT broker and yields publishes from the water quality topic.

pub mod mqtt;

pub use mqtt::{backoff_delay, mqtt_options, MqttError, MqttSubscriber};
