//! Fixed-window per-client request limiter.
//!
//! Deliberately a coarse fixed window, not a sliding window or token
//! bucket: the counter resets at the window boundary, so a client can admit
//! up to 2x the limit across that boundary. Consumers depend on the exact
//! admitted-request count, so this imprecision is part of the contract.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Buckets are swept lazily once the map reaches this size.
const SWEEP_THRESHOLD: usize = 1024;

struct Bucket {
    count: u32,
    window_expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Whole seconds until the window resets, set only on rejection
    pub retry_after_seconds: Option<u64>,
}

pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request for the client key.
    ///
    /// A bucket past its window is logically absent: the request that finds
    /// one starts a fresh window instead of being rejected.
    pub fn allow(&self, client_key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();

        if buckets.len() >= SWEEP_THRESHOLD {
            buckets.retain(|_, bucket| bucket.window_expires_at > now);
        }

        match buckets.get_mut(client_key) {
            Some(bucket) if bucket.window_expires_at > now => {
                if bucket.count < self.limit {
                    bucket.count += 1;
                    RateLimitDecision {
                        allowed: true,
                        retry_after_seconds: None,
                    }
                } else {
                    let remaining = bucket.window_expires_at.duration_since(now);
                    let mut seconds = remaining.as_secs();
                    if remaining.subsec_nanos() > 0 {
                        seconds += 1;
                    }
                    RateLimitDecision {
                        allowed: false,
                        retry_after_seconds: Some(seconds),
                    }
                }
            }
            _ => {
                buckets.insert(
                    client_key.to_string(),
                    Bucket {
                        count: 1,
                        window_expires_at: now + self.window,
                    },
                );
                RateLimitDecision {
                    allowed: true,
                    retry_after_seconds: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_rejects_with_retry_after() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60));

        assert!(limiter.allow("client-a").allowed);
        assert!(limiter.allow("client-a").allowed);

        let third = limiter.allow("client-a");
        assert!(!third.allowed);
        let retry_after = third.retry_after_seconds.unwrap();
        assert!(retry_after > 0);
        assert!(retry_after <= 60);
    }

    #[test]
    fn window_expiry_resets_the_bucket() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_millis(40));

        assert!(limiter.allow("client-a").allowed);
        assert!(!limiter.allow("client-a").allowed);

        std::thread::sleep(Duration::from_millis(70));
        assert!(limiter.allow("client-a").allowed);
    }

    #[test]
    fn clients_are_limited_independently() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.allow("client-a").allowed);
        assert!(limiter.allow("client-b").allowed);
        assert!(!limiter.allow("client-a").allowed);
        assert!(!limiter.allow("client-b").allowed);
    }
}
