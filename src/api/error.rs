use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::error::FetchError;

/// Error body returned to clients. The message is always generic; upstream
/// detail and key material never leave the process.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable internal error code for monitoring
    pub code: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad station or line code supplied by the caller; rejected before any
    /// fetch is attempted.
    #[error("{0}")]
    Validation(String),
    /// Rejected before any cache or fetch work.
    #[error("rate limit exceeded")]
    RateLimited { retry_after_seconds: u64 },
    /// Every queried station failed; nothing to serve.
    #[error(transparent)]
    Upstream(#[from] FetchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: message,
                    code: "validation_error".to_string(),
                }),
            )
                .into_response(),
            ApiError::RateLimited {
                retry_after_seconds,
            } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorResponse {
                        error: "Too many requests".to_string(),
                        code: "rate_limit_exceeded".to_string(),
                    }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_seconds));
                response
            }
            // Cooldown is distinguishable from a live outage so monitoring
            // can tell "provider is down" from "we are backing off".
            ApiError::Upstream(FetchError::CircuitOpen { .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "Departure data temporarily unavailable".to_string(),
                    code: "upstream_cooldown".to_string(),
                }),
            )
                .into_response(),
            ApiError::Upstream(err) => {
                tracing::error!(error = %err, "All station fetches failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ErrorResponse {
                        error: "Failed to fetch departure data".to_string(),
                        code: "upstream_error".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}
