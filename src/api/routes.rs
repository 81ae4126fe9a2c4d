//! API route definitions
//!
//! - /api/v1/health - liveness and sink backend
//! - /api/v1/sensors - registered sensor definitions
//! - /api/v1/latest - most recent aggregated result list
//! - /api/v1/stats - message and write counters

use axum::{routing::get, Router};

use super::handlers::{self, DashboardState};

/// Create all v1 API routes
pub fn api_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/sensors", get(handlers::get_sensors))
        .route("/latest", get(handlers::get_latest))
        .route("/stats", get(handlers::get_stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AppState, IngestionPipeline};
    use crate::sensors::SensorRegistry;
    use crate::storage::{MemorySink, PointSink};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    fn create_test_state() -> DashboardState {
        DashboardState::new(
            Arc::new(RwLock::new(AppState::default())),
            Arc::new(SensorRegistry::standard()),
            Arc::new(MemorySink::default()),
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_api_routes_health() {
        let (status, body) = get_json(api_routes(create_test_state()), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["system_status"], "starting");
        assert_eq!(body["sink"], "memory");
    }

    #[tokio::test]
    async fn test_api_routes_sensors_in_registry_order() {
        let (status, body) = get_json(api_routes(create_test_state()), "/sensors").await;

        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["pH", "TDS", "Temperature"]);
        assert_eq!(body[0]["field"], "ph");
        assert_eq!(body[0]["safe_range"]["min"], 6.5);
    }

    #[tokio::test]
    async fn test_api_routes_latest_empty_then_populated() {
        let state = create_test_state();

        let (_, body) = get_json(api_routes(state.clone()), "/latest").await;
        assert!(body["timestamp"].is_null());
        assert_eq!(body["results"].as_array().unwrap().len(), 0);

        let pipeline = IngestionPipeline::new(Arc::clone(&state.registry), Arc::clone(&state.sink));
        let outcome = pipeline.process(br#"{"ph": 6.9, "tds": 10, "temperature": 34.6}"#);
        {
            let mut app_state = state.app_state.write().await;
            app_state.latest_results = outcome.results().to_vec();
            app_state.last_message_time = Some(chrono::Utc::now());
        }

        let (_, body) = get_json(api_routes(state), "/latest").await;
        assert!(body["timestamp"].is_string());
        assert_eq!(body["results"][0]["sensor"], "pH");
        assert_eq!(body["results"][0]["status"], "Warning");
        assert_eq!(body["results"][0]["color"], "orange");
        assert_eq!(body["results"][2]["unit"], "°C");
    }

    #[tokio::test]
    async fn test_api_routes_stats_include_write_counters() {
        let state = create_test_state();
        let sink: Arc<dyn PointSink> = Arc::clone(&state.sink);
        let pipeline = IngestionPipeline::new(Arc::clone(&state.registry), sink);
        pipeline.process(br#"{"ph": 7.0, "tds": 250}"#);

        let (status, body) = get_json(api_routes(state), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["writes"]["written"], 2);
        assert_eq!(body["writes"]["dropped"], 0);
        assert_eq!(body["messages_received"], 0);
        assert!(body["uptime_secs"].is_u64());
    }
}
