//! Metlink OpenData API client.
//!
//! Fetches real-time stop predictions per station from the
//! `stop-predictions` endpoint. The API requires an `x-api-key` header and
//! enforces its own rate limits, so every call made here goes through the
//! resilience layer in `services::fetcher`.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::models::{Departure, Destination, TimePair};

const API_KEY_HEADER: &str = "x-api-key";

/// Source of raw per-station stop predictions.
///
/// Implemented by [`MetlinkClient`] in production and by in-memory fakes in
/// tests of the layers above.
pub trait StopPredictions: Send + Sync {
    fn stop_predictions(
        &self,
        stop_id: &str,
    ) -> impl Future<Output = Result<Vec<Prediction>, FetchError>> + Send;
}

/// HTTP client for the Metlink OpenData API.
pub struct MetlinkClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl MetlinkClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl StopPredictions for MetlinkClient {
    fn stop_predictions(
        &self,
        stop_id: &str,
    ) -> impl Future<Output = Result<Vec<Prediction>, FetchError>> + Send {
        async move {
            let url = format!(
                "{}/stop-predictions?stop_id={}",
                self.base_url,
                urlencoding::encode(stop_id)
            );

            debug!(url = %url, stop_id = %stop_id, "Fetching stop predictions");

            let response = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        FetchError::Timeout(e.to_string())
                    } else {
                        FetchError::Network(e.to_string())
                    }
                })?;

            let status = response.status();
            if status.is_client_error() {
                return Err(FetchError::ClientError(status.as_u16()));
            }
            if !status.is_success() {
                return Err(FetchError::ServerError(status.as_u16()));
            }

            let body = response.text().await.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(e.to_string())
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

            let parsed: StopPredictionsResponse = serde_json::from_str(&body).map_err(|e| {
                tracing::warn!(
                    stop_id = %stop_id,
                    error = %e,
                    body = body_snippet(&body),
                    "Failed to parse stop predictions response"
                );
                FetchError::Parse(e.to_string())
            })?;

            Ok(parsed.departures)
        }
    }
}

/// Leading slice of an unparseable body for the warn log. Cut on a char
/// boundary: stop names carry macrons, and byte 500 may land inside one.
fn body_snippet(body: &str) -> &str {
    let mut cut = body.len().min(500);
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    &body[..cut]
}

// Response structures

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopPredictionsResponse {
    pub farezone: Option<String>,
    pub closed: Option<bool>,
    #[serde(default)]
    pub departures: Vec<Prediction>,
}

/// One raw departure prediction as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub service_id: Option<String>,
    pub stop_id: Option<String>,
    pub trip_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub direction: Option<String>,
    pub status: Option<String>,
    /// ISO-8601 duration (e.g., "PT2M30S")
    pub delay: Option<String>,
    pub monitored: Option<bool>,
    pub origin: Option<PredictionStop>,
    pub destination: Option<PredictionStop>,
    pub arrival: Option<PredictionTime>,
    pub departure: Option<PredictionTime>,
    pub disruption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionStop {
    pub stop_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionTime {
    pub aimed: Option<DateTime<Utc>>,
    pub expected: Option<DateTime<Utc>>,
}

impl Prediction {
    /// Line identifier for this prediction, if the provider supplied one.
    pub fn service_id(&self) -> Option<&str> {
        self.service_id.as_deref()
    }

    /// Convert into a [`Departure`] tagged with the station it was queried
    /// from. Predictions without a service id are not usable.
    pub fn into_departure(self, station: &str) -> Option<Departure> {
        let service_id = self.service_id?;
        let destination = self.destination.unwrap_or(PredictionStop {
            stop_id: None,
            name: None,
        });
        let departure = self.departure.unwrap_or(PredictionTime {
            aimed: None,
            expected: None,
        });

        Some(Departure {
            service_id,
            station: station.to_string(),
            destination: Destination {
                stop_id: destination.stop_id.unwrap_or_default(),
                name: destination.name.unwrap_or_default(),
            },
            departure: TimePair {
                aimed: departure.aimed,
                expected: departure.expected,
            },
            status: self.status,
            delay: self.delay,
            disruption: self.disruption,
        })
    }
}
