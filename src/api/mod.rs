//! REST API module using Axum
//!
//! Read-only status surface for the ingestion service: health, the sensor
//! registry, the latest aggregated result list and delivery counters.

pub mod handlers;
mod routes;

pub use handlers::DashboardState;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Environment variable with comma-separated origins allowed cross-origin access.
pub const CORS_ORIGINS_ENV_VAR: &str = "SIMOKA_CORS_ORIGINS";

/// Build a CORS layer for GET requests.
///
/// Same-origin only unless `SIMOKA_CORS_ORIGINS` lists origins (e.g. a
/// dashboard dev server on `http://localhost:5173`); `*` allows any origin.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    match std::env::var(CORS_ORIGINS_ENV_VAR) {
        Ok(origins) if origins.trim() == "*" => {
            tracing::info!("CORS: allowing any origin");
            base.allow_origin(AllowOrigin::any())
        }
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(handlers::get_banner))
        .nest("/api/v1", routes::api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
