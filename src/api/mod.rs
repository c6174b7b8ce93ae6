pub mod departures;
pub mod error;
pub mod health;
pub mod status;

pub use error::{ApiError, ErrorResponse};

use axum::http::HeaderMap;
use axum::{routing::get, Router};
use std::sync::Arc;

use crate::config::LineConfig;
use crate::providers::MetlinkClient;
use crate::resilience::CircuitBreaker;
use crate::services::{Aggregator, BoardCache, FixedWindowLimiter, ResilientFetcher};

/// The production aggregation pipeline behind the API.
pub type LiveAggregator = Aggregator<ResilientFetcher<MetlinkClient>>;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<LiveAggregator>,
    pub cache: Arc<BoardCache>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub breaker: Arc<CircuitBreaker>,
    pub line: Arc<LineConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/departures", get(departures::get_departure_board))
        .route("/status", get(status::get_status))
        .route("/health", get(health::health_check))
        .with_state(state)
}

/// Client identity for rate limiting: first hop of the forwarded-IP chain,
/// falling back to a shared anonymous bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|chain| chain.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}
