use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::BreakerConfig;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Upstream assumed down, requests fail fast
    Open,
    /// Limited trial calls to test upstream recovery
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    /// Monotonic clock for cooldown arithmetic
    last_failure: Option<Instant>,
    /// Wall clock for the status surface
    last_failure_at: Option<DateTime<Utc>>,
    half_open_attempts: u32,
}

/// Point-in-time view of the breaker for the status surface.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Milliseconds until the breaker will admit a trial call; 0 unless open
    pub cooldown_remaining_ms: u64,
}

/// Failure-isolation guard for the single upstream provider.
///
/// Callers must check [`can_request`](Self::can_request) before the guarded
/// call and record exactly one of success/failure after it resolves. When
/// `can_request` returns false the caller fails fast without touching the
/// network; shielding a failing upstream from continued load is the entire
/// point of the breaker.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    half_open_max_calls: u32,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration, half_open_max_calls: u32) -> Self {
        Self {
            failure_threshold,
            cooldown,
            half_open_max_calls,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                last_failure_at: None,
                half_open_attempts: 0,
            }),
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(
            config.failure_threshold,
            Duration::from_secs(config.cooldown_secs),
            config.half_open_max_calls,
        )
    }

    /// Whether a guarded call may be attempted right now.
    ///
    /// An open breaker transitions to half-open once the cooldown has
    /// elapsed; the admitting call counts as the first trial. While
    /// half-open, at most `half_open_max_calls` callers are admitted until
    /// an outcome is recorded.
    pub fn can_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(false);
                if cooled_down {
                    info!("Circuit breaker cooldown elapsed, entering half-open trial");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_attempts = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_attempts < self.half_open_max_calls {
                    inner.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful guarded call. Any success fully recovers the
    /// breaker, even a single one while half-open.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!("Circuit breaker closed after successful call");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.last_failure_at = None;
        inner.half_open_attempts = 0;
    }

    /// Record a failed guarded call. A single failed trial while half-open
    /// re-opens the breaker immediately, regardless of the threshold.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => {
                warn!("Circuit breaker re-opened: trial call failed");
                inner.state = CircuitState::Open;
                inner.half_open_attempts = 0;
            }
            CircuitState::Closed if inner.failure_count >= self.failure_threshold => {
                warn!(
                    failure_count = inner.failure_count,
                    cooldown_secs = self.cooldown.as_secs(),
                    "Circuit breaker opened: failure threshold reached"
                );
                inner.state = CircuitState::Open;
            }
            _ => {}
        }
    }

    /// Milliseconds until the breaker will admit a trial call (0 unless open).
    pub fn cooldown_remaining_ms(&self) -> u64 {
        let inner = self.inner.lock();
        Self::remaining_ms(&inner, self.cooldown)
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock();
        CircuitBreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_at: inner.last_failure_at,
            cooldown_remaining_ms: Self::remaining_ms(&inner, self.cooldown),
        }
    }

    fn remaining_ms(inner: &BreakerInner, cooldown: Duration) -> u64 {
        if inner.state != CircuitState::Open {
            return 0;
        }
        inner
            .last_failure
            .map(|at| cooldown.saturating_sub(at.elapsed()).as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64, half_open_max: u32) -> CircuitBreaker {
        CircuitBreaker::new(threshold, Duration::from_millis(cooldown_ms), half_open_max)
    }

    #[test]
    fn starts_closed_and_admits_requests() {
        let cb = breaker(5, 60_000, 2);
        assert!(cb.can_request());
        assert_eq!(cb.snapshot().state, CircuitState::Closed);
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = breaker(5, 60_000, 2);
        for _ in 0..5 {
            cb.record_failure();
        }
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.failure_count, 5);
        assert!(snap.last_failure_at.is_some());
        assert!(snap.cooldown_remaining_ms > 0);
        assert!(!cb.can_request());
    }

    #[test]
    fn stays_closed_below_threshold() {
        let cb = breaker(5, 60_000, 2);
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.snapshot().state, CircuitState::Closed);
        assert!(cb.can_request());
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = breaker(5, 60_000, 2);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        let snap = cb.snapshot();
        assert_eq!(snap.failure_count, 0);
        assert!(snap.last_failure_at.is_none());
    }

    #[test]
    fn half_open_after_cooldown_with_limited_trials() {
        let cb = breaker(1, 50, 2);
        cb.record_failure();
        assert!(!cb.can_request());

        std::thread::sleep(Duration::from_millis(80));

        // First admission transitions to half-open and counts as a trial.
        assert!(cb.can_request());
        assert_eq!(cb.snapshot().state, CircuitState::HalfOpen);
        // Second trial admitted, third rejected until an outcome lands.
        assert!(cb.can_request());
        assert!(!cb.can_request());
    }

    #[test]
    fn single_success_while_half_open_closes() {
        let cb = breaker(1, 50, 2);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(80));
        assert!(cb.can_request());

        cb.record_success();
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.cooldown_remaining_ms, 0);
    }

    #[test]
    fn failure_while_half_open_reopens_immediately() {
        let cb = breaker(5, 50, 2);
        for _ in 0..5 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(80));
        assert!(cb.can_request());
        assert_eq!(cb.snapshot().state, CircuitState::HalfOpen);

        // One failed trial is enough, threshold does not apply here.
        cb.record_failure();
        assert_eq!(cb.snapshot().state, CircuitState::Open);
        assert!(!cb.can_request());
    }
}
