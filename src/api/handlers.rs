//! API route handlers
//!
//! All endpoints are read-only views over [`AppState`], the sensor registry
//! and the point sink's delivery counters.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::pipeline::{AppState, PipelineStats, SystemStatus};
use crate::sensors::{SensorDefinition, SensorRegistry};
use crate::storage::PointSink;
use crate::types::SensorResult;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct DashboardState {
    /// Application state from the processing loop
    pub app_state: Arc<RwLock<AppState>>,
    pub registry: Arc<SensorRegistry>,
    pub sink: Arc<dyn PointSink>,
}

impl DashboardState {
    pub fn new(
        app_state: Arc<RwLock<AppState>>,
        registry: Arc<SensorRegistry>,
        sink: Arc<dyn PointSink>,
    ) -> Self {
        Self {
            app_state,
            registry,
            sink,
        }
    }
}

// ============================================================================
// Banner
// ============================================================================

/// GET /
pub async fn get_banner() -> &'static str {
    "SIMOKA water quality ingestion is running. See /api/v1/health."
}

// ============================================================================
// Health Endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub system_status: SystemStatus,
    pub uptime_secs: u64,
    /// Point sink backend (`influxdb` or `memory`)
    pub sink: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/v1/health
pub async fn get_health(State(state): State<DashboardState>) -> Json<HealthResponse> {
    let app_state = state.app_state.read().await;

    Json(HealthResponse {
        status: "ok",
        system_status: app_state.status,
        uptime_secs: app_state.uptime_secs(),
        sink: state.sink.backend_name(),
        timestamp: Utc::now(),
    })
}

// ============================================================================
// Registry Endpoint
// ============================================================================

/// GET /api/v1/sensors - registered sensor kinds in evaluation order
pub async fn get_sensors(State(state): State<DashboardState>) -> Json<Vec<SensorDefinition>> {
    Json(state.registry.list())
}

// ============================================================================
// Latest Results Endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    /// When the last message completed; `None` before the first one
    pub timestamp: Option<DateTime<Utc>>,
    pub results: Vec<SensorResult>,
}

/// GET /api/v1/latest - result list of the most recent completed message
pub async fn get_latest(State(state): State<DashboardState>) -> Json<LatestResponse> {
    let app_state = state.app_state.read().await;

    Json(LatestResponse {
        timestamp: app_state.last_message_time,
        results: app_state.latest_results.clone(),
    })
}

// ============================================================================
// Stats Endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub pipeline: PipelineStats,
    pub uptime_secs: u64,
}

/// GET /api/v1/stats - message counters and point delivery counters
pub async fn get_stats(State(state): State<DashboardState>) -> Json<StatsResponse> {
    let app_state = state.app_state.read().await;

    Json(StatsResponse {
        pipeline: app_state.stats(state.sink.stats()),
        uptime_secs: app_state.uptime_secs(),
    })
}
