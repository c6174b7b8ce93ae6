use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Travel direction relative to the Wellington terminus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Terminus of a service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Destination {
    /// Destination stop code (e.g., "WELL" or platform variant "WELL1")
    pub stop_id: String,
    /// Human-readable destination name (e.g., "Wellington")
    pub name: String,
}

/// Aimed and real-time departure timestamps for one stop event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimePair {
    /// Scheduled departure time
    pub aimed: Option<DateTime<Utc>>,
    /// Real-time estimate, when the provider has one
    pub expected: Option<DateTime<Utc>>,
}

impl TimePair {
    /// Best available time for ordering: real-time estimate if present,
    /// otherwise the timetable. Missing both sorts earliest.
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.expected
            .or(self.aimed)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// One scheduled or real-time service instance at a queried station.
///
/// Immutable once produced by the upstream call; the aggregation pipeline
/// only filters and copies these.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Departure {
    /// Line identifier (e.g., "WRL")
    pub service_id: String,
    /// Station code this departure was queried from
    pub station: String,
    pub destination: Destination,
    pub departure: TimePair,
    /// Free-form provider status (e.g., "delayed", "cancelled")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// ISO-8601 duration string (e.g., "PT2M30S")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,
    /// Disruption note attached by the provider, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disruption: Option<String>,
}

/// Direction-split, time-ordered departures for one aggregation cycle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeparturesResult {
    pub inbound: Vec<Departure>,
    pub outbound: Vec<Departure>,
    /// Count across both directions, before any truncation by a consumer
    pub total: usize,
}
