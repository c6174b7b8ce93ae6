use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ErrorResponse};
use crate::api::{client_key, AppState};
use crate::config::LineConfig;
use crate::error::FetchError;
use crate::models::Departure;
use crate::services::aggregator::Aggregator;
use crate::services::cache::BoardCache;
use crate::services::fetcher::FetchStationDepartures;

#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
    /// Comma-separated station codes; defaults to every configured station
    pub stations: Option<String>,
    /// Line code; defaults to the configured line
    pub line: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BoardResponse {
    pub inbound: Vec<Departure>,
    pub outbound: Vec<Departure>,
    /// Departures across both directions before any truncation
    pub total: usize,
    /// Whether this response was served from the TTL cache
    pub cached: bool,
    /// Cache entry age as "<seconds>s", present only on cache hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age: Option<String>,
}

/// Resolve and validate the requested station set and line code.
///
/// Validation happens before any cache or fetch work, so a bad code never
/// costs an upstream call.
fn resolve_request(
    line: &LineConfig,
    query: &BoardQuery,
) -> Result<(Vec<String>, String), ApiError> {
    let service_id = match &query.line {
        Some(code) if !code.trim().is_empty() => code.trim().to_uppercase(),
        _ => line.default_service_id.clone(),
    };
    if service_id != line.default_service_id {
        return Err(ApiError::Validation(format!(
            "unknown line code: {}",
            service_id
        )));
    }

    let stations: Vec<String> = match &query.stations {
        Some(csv) => csv
            .split(',')
            .map(|code| code.trim().to_uppercase())
            .filter(|code| !code.is_empty())
            .collect(),
        None => Vec::new(),
    };
    if stations.is_empty() {
        return Ok((line.stations.clone(), service_id));
    }

    for code in &stations {
        if !line.stations.contains(code) {
            return Err(ApiError::Validation(format!(
                "unknown station code: {}",
                code
            )));
        }
    }
    Ok((stations, service_id))
}

/// Serve a departure board: cache lookup first, aggregation on a miss.
///
/// A cycle in which every station failed is not cached and surfaces as an
/// upstream error; a partially degraded cycle is served and cached like a
/// healthy one.
pub(crate) async fn build_board<F: FetchStationDepartures>(
    aggregator: &Aggregator<F>,
    cache: &BoardCache,
    line: &LineConfig,
    query: &BoardQuery,
) -> Result<BoardResponse, ApiError> {
    let (stations, service_id) = resolve_request(line, query)?;
    let key = BoardCache::key(&stations, &service_id);

    if let Some(payload) = cache.get(&key) {
        let age = cache.age_seconds(&key).unwrap_or(0);
        return Ok(BoardResponse {
            inbound: payload.inbound,
            outbound: payload.outbound,
            total: payload.total,
            cached: true,
            cache_age: Some(format!("{}s", age)),
        });
    }

    let mut aggregation = aggregator.aggregate(&stations, &service_id).await;
    if !stations.is_empty() && aggregation.failed_stations.len() == stations.len() {
        // Surface a cooldown over a generic upstream failure on mixed
        // cycles, so the status code does not depend on station order.
        let picked = aggregation
            .failed_stations
            .iter()
            .position(|(_, err)| matches!(err, FetchError::CircuitOpen { .. }))
            .unwrap_or(0);
        let (_, err) = aggregation.failed_stations.swap_remove(picked);
        return Err(ApiError::Upstream(err));
    }

    cache.set(&key, aggregation.result.clone(), cache.default_ttl());

    Ok(BoardResponse {
        inbound: aggregation.result.inbound,
        outbound: aggregation.result.outbound,
        total: aggregation.result.total,
        cached: false,
        cache_age: None,
    })
}

/// Departure board for the requested stations and line
#[utoipa::path(
    get,
    path = "/api/departures",
    params(
        ("stations" = Option<String>, Query, description = "Comma-separated station codes (e.g., FEAT,PETO); defaults to all configured stations"),
        ("line" = Option<String>, Query, description = "Line code (e.g., WRL); defaults to the configured line")
    ),
    responses(
        (status = 200, description = "Direction-split, time-ordered departures", body = BoardResponse),
        (status = 400, description = "Unknown station or line code", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded; Retry-After carries the wait in seconds", body = ErrorResponse),
        (status = 502, description = "Upstream provider unavailable", body = ErrorResponse),
        (status = 503, description = "Upstream in circuit-breaker cooldown", body = ErrorResponse)
    ),
    tag = "departures"
)]
pub async fn get_departure_board(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BoardQuery>,
) -> Result<Json<BoardResponse>, ApiError> {
    let decision = state.limiter.allow(&client_key(&headers));
    if !decision.allowed {
        return Err(ApiError::RateLimited {
            retry_after_seconds: decision.retry_after_seconds.unwrap_or(1),
        });
    }

    let board = build_board(&state.aggregator, &state.cache, &state.line, &query).await?;
    Ok(Json(board))
}
