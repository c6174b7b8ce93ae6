//! Resilient per-station departure fetching.
//!
//! Combines the circuit breaker, the retry policy and the upstream client
//! into "fetch filtered departures for one station". Every attempt,
//! including each retry, is gated through the shared breaker; the breaker
//! outcome is recorded once per invocation, after retries are exhausted or
//! the call finally succeeds.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

use crate::error::FetchError;
use crate::models::Departure;
use crate::providers::StopPredictions;
use crate::resilience::{CircuitBreaker, RetryPolicy};

/// Per-station departure fetch, the seam the aggregator fans out over.
pub trait FetchStationDepartures: Send + Sync {
    fn fetch_station_departures(
        &self,
        station: &str,
        service_id: &str,
    ) -> impl Future<Output = Result<Vec<Departure>, FetchError>> + Send;
}

pub struct ResilientFetcher<S> {
    source: S,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl<S: StopPredictions> ResilientFetcher<S> {
    pub fn new(source: S, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self {
            source,
            breaker,
            retry,
        }
    }
}

impl<S: StopPredictions> FetchStationDepartures for ResilientFetcher<S> {
    fn fetch_station_departures(
        &self,
        station: &str,
        service_id: &str,
    ) -> impl Future<Output = Result<Vec<Departure>, FetchError>> + Send {
        async move {
            // Failures from real attempts, kept so a breaker block mid-way
            // through the retry loop still resolves to a recorded outcome.
            let last_failure = Mutex::new(None::<FetchError>);
            let result = self
                .retry
                .run(
                    || {
                        let last_failure = &last_failure;
                        async move {
                            // Checked per attempt: the breaker may trip while
                            // a backoff sleep is in progress. An open breaker
                            // short-circuits without touching the network.
                            if !self.breaker.can_request() {
                                return Err(FetchError::CircuitOpen {
                                    cooldown_remaining_ms: self.breaker.cooldown_remaining_ms(),
                                });
                            }
                            self.source.stop_predictions(station).await.map_err(|err| {
                                *last_failure.lock() = Some(err.clone());
                                err
                            })
                        }
                    },
                    FetchError::is_retryable,
                )
                .await;

            match result {
                Ok(predictions) => {
                    self.breaker.record_success();
                    Ok(predictions
                        .into_iter()
                        .filter(|p| p.service_id() == Some(service_id))
                        .filter_map(|p| p.into_departure(station))
                        .collect())
                }
                Err(FetchError::CircuitOpen {
                    cooldown_remaining_ms,
                }) => match last_failure.into_inner() {
                    // The breaker blocked a retry after real attempts had
                    // already failed. Those failures are this invocation's
                    // outcome; leaving them unrecorded would strand the
                    // breaker half-open with every trial slot spent.
                    Some(err) => {
                        self.breaker.record_failure();
                        Err(err)
                    }
                    // No call was made, so there is no outcome to record.
                    None => Err(FetchError::CircuitOpen {
                        cooldown_remaining_ms,
                    }),
                },
                Err(err) => {
                    self.breaker.record_failure();
                    Err(err)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::metlink::Prediction;
    use crate::resilience::CircuitState;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn prediction(service_id: &str, destination: &str) -> Prediction {
        serde_json::from_value(json!({
            "service_id": service_id,
            "stop_id": "FEAT",
            "destination": { "stop_id": destination, "name": destination },
            "departure": { "aimed": "2024-06-12T08:15:00+12:00", "expected": null }
        }))
        .unwrap()
    }

    struct FakeSource {
        calls: AtomicU32,
        fail_with: Option<fn() -> FetchError>,
    }

    impl FakeSource {
        fn healthy() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_with: None,
            }
        }

        fn failing(make_error: fn() -> FetchError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_with: Some(make_error),
            }
        }
    }

    impl StopPredictions for FakeSource {
        fn stop_predictions(
            &self,
            _stop_id: &str,
        ) -> impl Future<Output = Result<Vec<Prediction>, FetchError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = match self.fail_with {
                Some(make_error) => Err(make_error()),
                None => Ok(vec![
                    prediction("WRL", "WELL"),
                    prediction("HVL", "UPPE"),
                    prediction("WRL", "MAST"),
                ]),
            };
            async move { result }
        }
    }

    fn fetcher(source: FakeSource, breaker: Arc<CircuitBreaker>) -> ResilientFetcher<FakeSource> {
        ResilientFetcher::new(
            source,
            breaker,
            RetryPolicy::new(3, Duration::from_millis(1)),
        )
    }

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(5, Duration::from_secs(60), 2))
    }

    #[tokio::test]
    async fn filters_predictions_to_requested_line() {
        let breaker = breaker();
        let fetcher = fetcher(FakeSource::healthy(), breaker.clone());

        let departures = fetcher
            .fetch_station_departures("FEAT", "WRL")
            .await
            .unwrap();

        assert_eq!(departures.len(), 2);
        assert!(departures.iter().all(|d| d.service_id == "WRL"));
        assert!(departures.iter().all(|d| d.station == "FEAT"));
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn records_one_breaker_failure_per_invocation() {
        let breaker = breaker();
        let fetcher = fetcher(
            FakeSource::failing(|| FetchError::ServerError(503)),
            breaker.clone(),
        );

        let result = fetcher.fetch_station_departures("FEAT", "WRL").await;

        assert!(matches!(result, Err(FetchError::ServerError(503))));
        // Three raw attempts, one recorded outcome.
        assert_eq!(fetcher.source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.snapshot().failure_count, 1);
    }

    #[tokio::test]
    async fn client_error_is_not_retried_but_still_counted() {
        let breaker = breaker();
        let fetcher = fetcher(
            FakeSource::failing(|| FetchError::ClientError(400)),
            breaker.clone(),
        );

        let result = fetcher.fetch_station_departures("FEAT", "WRL").await;

        assert!(matches!(result, Err(FetchError::ClientError(400))));
        assert_eq!(fetcher.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.snapshot().failure_count, 1);
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_without_network_call() {
        let breaker = breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.snapshot().state, CircuitState::Open);

        let fetcher = fetcher(FakeSource::healthy(), breaker.clone());
        let result = fetcher.fetch_station_departures("FEAT", "WRL").await;

        assert!(matches!(result, Err(FetchError::CircuitOpen { .. })));
        assert_eq!(fetcher.source.calls.load(Ordering::SeqCst), 0);
        // A short-circuit is not an upstream outcome.
        assert_eq!(breaker.snapshot().failure_count, 5);
    }

    #[tokio::test]
    async fn exhausted_half_open_trials_reopen_instead_of_sticking() {
        let breaker = Arc::new(CircuitBreaker::new(5, Duration::from_millis(50), 2));
        for _ in 0..5 {
            breaker.record_failure();
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Both half-open trial slots go to failing attempts of a single
        // invocation; the third attempt is blocked by the breaker. The
        // invocation must still resolve to the real error and a recorded
        // failure, re-opening the breaker rather than leaving it half-open
        // with no pending caller.
        let failing = fetcher(
            FakeSource::failing(|| FetchError::ServerError(503)),
            breaker.clone(),
        );
        let result = failing.fetch_station_departures("FEAT", "WRL").await;

        assert!(matches!(result, Err(FetchError::ServerError(503))));
        assert_eq!(failing.source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.snapshot().state, CircuitState::Open);

        // After the next cooldown a recovered upstream closes the breaker.
        tokio::time::sleep(Duration::from_millis(80)).await;
        let healthy = fetcher(FakeSource::healthy(), breaker.clone());
        healthy
            .fetch_station_departures("FEAT", "WRL")
            .await
            .unwrap();
        assert_eq!(healthy.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn success_recovers_the_breaker() {
        let breaker = breaker();
        breaker.record_failure();
        breaker.record_failure();

        let fetcher = fetcher(FakeSource::healthy(), breaker.clone());
        fetcher
            .fetch_station_departures("FEAT", "WRL")
            .await
            .unwrap();

        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
    }
}
