use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::resilience::CircuitBreakerSnapshot;
use crate::services::cache::{BoardCache, CacheInfo};

/// Degraded-mode visibility for operators: cache freshness for the default
/// board plus the circuit breaker's current state.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub cache: CacheInfo,
    pub circuit: CircuitBreakerSnapshot,
}

/// Pipeline status: default-board cache freshness and breaker state
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Cache and circuit breaker status", body = StatusResponse)
    ),
    tag = "status"
)]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let default_key = BoardCache::key(&state.line.stations, &state.line.default_service_id);
    Json(StatusResponse {
        cache: state.cache.info(&default_key),
        circuit: state.breaker.snapshot(),
    })
}
