//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Wire Contract
// ============================================================================

/// Topic carrying water quality payloads.
pub const WATER_QUALITY_TOPIC: &str = "water/quality";

/// Measurement name of every persisted point.
pub const MEASUREMENT: &str = "water_quality";

// ============================================================================
// Pipeline
// ============================================================================

/// Emit a progress line every N processed messages.
pub const PROGRESS_LOG_INTERVAL: u64 = 10;

/// Maximum number of raw payload bytes echoed into a parse-failure log line.
pub const MAX_LOGGED_PAYLOAD_BYTES: usize = 512;

// ============================================================================
// MQTT Subscriber
// ============================================================================

/// Capacity of the rumqttc request channel (subscribe / unsubscribe / disconnect).
pub const MQTT_REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Upper bound on waiting for the broker to acknowledge a disconnect (seconds).
pub const MQTT_DISCONNECT_TIMEOUT_SECS: u64 = 2;

/// Default MQTT packet size limit (bytes), incoming and outgoing.
///
/// rumqttc rejects a larger packet by dropping the connection, not the message.
pub const MQTT_MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Largest packet the MQTT remaining-length field can encode (bytes).
pub const MQTT_PROTOCOL_MAX_PACKET_SIZE: usize = 268_435_455;

// ============================================================================
// Shutdown
// ============================================================================

/// How long supervised tasks get to finish after cancellation (seconds).
pub const SHUTDOWN_GRACE_SECS: u64 = 10;
