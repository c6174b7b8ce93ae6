//! Multi-station aggregation.
//!
//! Fans the resilient fetcher out across every requested station in
//! parallel, folds the per-station outcomes into one flattened list, sorts
//! it by best available time and splits it by travel direction. A failed
//! station contributes an empty list and a warning; it never aborts the
//! rest of the request.

use futures::future::join_all;
use tracing::warn;

use crate::error::FetchError;
use crate::models::{Departure, DeparturesResult, Direction};
use crate::services::fetcher::FetchStationDepartures;

/// Terminus stop codes whose services are heading into Wellington.
///
/// Platform-suffixed variants ("WELL1", "WELL2", ...) normalize to the bare
/// code before lookup, so classification is total: anything not in this
/// table is outbound.
const INBOUND_TERMINI: &[&str] = &["WELL"];

/// Classify a departure by its destination stop code.
pub fn classify_direction(destination_stop: &str) -> Direction {
    let code = destination_stop.trim();
    if INBOUND_TERMINI.contains(&code) {
        return Direction::Inbound;
    }
    let normalized = code.trim_end_matches(|c: char| c.is_ascii_digit());
    if !normalized.is_empty() && INBOUND_TERMINI.contains(&normalized) {
        Direction::Inbound
    } else {
        Direction::Outbound
    }
}

/// Outcome of one aggregation cycle: the direction-split board plus a
/// diagnostics record of the stations that contributed nothing.
#[derive(Debug)]
pub struct Aggregation {
    pub result: DeparturesResult,
    pub failed_stations: Vec<(String, FetchError)>,
}

pub struct Aggregator<F> {
    fetcher: F,
}

impl<F: FetchStationDepartures> Aggregator<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch, merge, sort and classify departures for all requested
    /// stations.
    ///
    /// Station fetches run in parallel and are independent; each failure is
    /// folded into the diagnostics record instead of propagating. The same
    /// physical trip visible from two queried stations appears twice; no
    /// cross-station deduplication is performed.
    pub async fn aggregate(&self, stations: &[String], service_id: &str) -> Aggregation {
        let fetches = stations.iter().map(|station| async move {
            let result = self
                .fetcher
                .fetch_station_departures(station, service_id)
                .await;
            (station.as_str(), result)
        });
        let outcomes = join_all(fetches).await;

        let mut all_departures = Vec::new();
        let mut failed_stations = Vec::new();
        for (station, outcome) in outcomes {
            match outcome {
                Ok(mut departures) => all_departures.append(&mut departures),
                Err(err) => {
                    warn!(
                        station = %station,
                        error = %err,
                        "Station fetch failed, contributing no departures"
                    );
                    failed_stations.push((station.to_string(), err));
                }
            }
        }

        if !failed_stations.is_empty() {
            warn!(
                failed = failed_stations.len(),
                requested = stations.len(),
                "Aggregation degraded: one or more stations unavailable"
            );
        }

        let total = all_departures.len();
        // Stable sort: departures sharing a timestamp keep fan-out order.
        all_departures.sort_by_key(|d| d.departure.sort_key());

        let (inbound, outbound) = all_departures
            .into_iter()
            .partition(|d| classify_direction(&d.destination.stop_id) == Direction::Inbound);

        Aggregation {
            result: DeparturesResult {
                inbound,
                outbound,
                total,
            },
            failed_stations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Destination, TimePair};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::future::Future;

    fn departure(station: &str, destination: &str, expected_minute: Option<u32>) -> Departure {
        Departure {
            service_id: "WRL".to_string(),
            station: station.to_string(),
            destination: Destination {
                stop_id: destination.to_string(),
                name: destination.to_string(),
            },
            departure: TimePair {
                aimed: Some(Utc.with_ymd_and_hms(2024, 6, 12, 8, 0, 0).unwrap()),
                expected: expected_minute
                    .map(|m| Utc.with_ymd_and_hms(2024, 6, 12, 8, m, 0).unwrap()),
            },
            status: None,
            delay: None,
            disruption: None,
        }
    }

    /// Per-station canned responses; stations absent from the map fail.
    struct FakeFetcher {
        responses: HashMap<String, Vec<Departure>>,
    }

    impl FetchStationDepartures for FakeFetcher {
        fn fetch_station_departures(
            &self,
            station: &str,
            _service_id: &str,
        ) -> impl Future<Output = Result<Vec<Departure>, FetchError>> + Send {
            let result = self
                .responses
                .get(station)
                .cloned()
                .ok_or(FetchError::ServerError(500));
            async move { result }
        }
    }

    fn stations(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn failed_station_contributes_nothing_without_aborting() {
        let fetcher = FakeFetcher {
            responses: HashMap::from([
                (
                    "FEAT".to_string(),
                    vec![
                        departure("FEAT", "WELL", Some(10)),
                        departure("FEAT", "WELL", Some(40)),
                    ],
                ),
                ("CART".to_string(), vec![departure("CART", "MAST", Some(5))]),
            ]),
        };
        let aggregator = Aggregator::new(fetcher);

        let aggregation = aggregator
            .aggregate(&stations(&["FEAT", "PETO", "CART"]), "WRL")
            .await;

        assert_eq!(aggregation.result.total, 3);
        assert_eq!(aggregation.failed_stations.len(), 1);
        assert_eq!(aggregation.failed_stations[0].0, "PETO");
    }

    #[tokio::test]
    async fn sorts_by_expected_then_aimed_ascending() {
        let fetcher = FakeFetcher {
            responses: HashMap::from([(
                "FEAT".to_string(),
                vec![
                    departure("FEAT", "WELL", Some(45)),
                    departure("FEAT", "WELL", Some(5)),
                    // No estimate: sorts by the 08:00 aimed time.
                    departure("FEAT", "WELL", None),
                    departure("FEAT", "WELL", Some(20)),
                ],
            )]),
        };
        let aggregator = Aggregator::new(fetcher);

        let aggregation = aggregator.aggregate(&stations(&["FEAT"]), "WRL").await;
        let inbound = &aggregation.result.inbound;

        let keys: Vec<_> = inbound.iter().map(|d| d.departure.sort_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        // The estimate-less 08:00 departure comes first.
        assert!(inbound[0].departure.expected.is_none());
    }

    #[tokio::test]
    async fn classifies_platform_suffixed_terminus_as_inbound() {
        let fetcher = FakeFetcher {
            responses: HashMap::from([(
                "PETO".to_string(),
                vec![
                    departure("PETO", "WELL", Some(10)),
                    departure("PETO", "WELL1", Some(15)),
                    departure("PETO", "MAST", Some(20)),
                ],
            )]),
        };
        let aggregator = Aggregator::new(fetcher);

        let aggregation = aggregator.aggregate(&stations(&["PETO"]), "WRL").await;

        assert_eq!(aggregation.result.inbound.len(), 2);
        assert_eq!(aggregation.result.outbound.len(), 1);
        assert_eq!(aggregation.result.total, 3);
    }

    #[test]
    fn direction_table_is_total() {
        assert_eq!(classify_direction("WELL"), Direction::Inbound);
        assert_eq!(classify_direction("WELL1"), Direction::Inbound);
        assert_eq!(classify_direction("WELL9"), Direction::Inbound);
        assert_eq!(classify_direction("MAST"), Direction::Outbound);
        assert_eq!(classify_direction("UPPE"), Direction::Outbound);
        assert_eq!(classify_direction(""), Direction::Outbound);
        // Purely numeric codes must not normalize to the empty string.
        assert_eq!(classify_direction("1234"), Direction::Outbound);
    }
}
