//! Route configuration.

use crate::error::ServiceError;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/health - Health check.
///
/// Unauthenticated so load balancers and orchestrators can call it. Reports only
/// status and version.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ServiceError> {
    state
        .metadata
        .health_check()
        .await
        .map_err(|e| ServiceError::from_metadata("health_check", e))?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new().route("/v1/health", get(health_check));

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
