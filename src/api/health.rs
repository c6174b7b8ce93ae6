use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Line served by this deployment
    pub line: String,
    /// Number of configured station codes
    pub station_count: usize,
    /// Board cache TTL in seconds
    pub cache_ttl_secs: u64,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        line: state.line.default_service_id.clone(),
        station_count: state.line.stations.len(),
        cache_ttl_secs: state.cache.default_ttl().as_secs(),
    })
}
