//! Application State
//!
//! Shared state for the ingestion service, written by the processing loop and
//! read by API handlers. The pipeline itself retains nothing between messages;
//! the latest result list lives here.

use serde::Serialize;
use std::time::Instant;

use crate::storage::WriteStatsSnapshot;
use crate::types::SensorResult;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state accessible from API handlers and the processing loop.
///
/// Wrapped in `Arc<RwLock<>>` for access across the async runtime.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Process start, for uptime reporting
    pub started_at: Instant,

    /// Current system status
    pub status: SystemStatus,

    /// Messages received from the source (all topics)
    pub messages_received: u64,

    /// Messages that reached `Completed`
    pub messages_processed: u64,

    /// Messages discarded as `ParseFailed`
    pub parse_failures: u64,

    /// Messages ignored because they arrived on another topic
    pub messages_ignored: u64,

    /// Sensor readings excluded by extraction errors
    pub sensor_extraction_failures: u64,

    /// Result list of the last completed message
    pub latest_results: Vec<SensorResult>,

    /// When `latest_results` was produced
    pub last_message_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            status: SystemStatus::Starting,
            messages_received: 0,
            messages_processed: 0,
            parse_failures: 0,
            messages_ignored: 0,
            sensor_extraction_failures: 0,
            latest_results: Vec::new(),
            last_message_time: None,
        }
    }
}

impl AppState {
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Message counters paired with the sink's write counters
    pub fn stats(&self, writes: WriteStatsSnapshot) -> PipelineStats {
        PipelineStats {
            messages_received: self.messages_received,
            messages_processed: self.messages_processed,
            parse_failures: self.parse_failures,
            messages_ignored: self.messages_ignored,
            sensor_extraction_failures: self.sensor_extraction_failures,
            writes,
        }
    }
}

// ============================================================================
// System Status
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    /// Waiting for the source to connect
    #[default]
    Starting,
    /// Consuming messages
    Ingesting,
    /// Source exhausted or cancelled
    Stopped,
}

// ============================================================================
// Pipeline Statistics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub parse_failures: u64,
    pub messages_ignored: u64,
    pub sensor_extraction_failures: u64,
    pub writes: WriteStatsSnapshot,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} messages ({} processed, {} malformed, {} ignored), {} sensor skips, {} points written, {} dropped",
            self.messages_received,
            self.messages_processed,
            self.parse_failures,
            self.messages_ignored,
            self.sensor_extraction_failures,
            self.writes.written,
            self.writes.dropped
        )
    }
}
