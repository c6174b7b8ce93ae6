use thiserror::Error;

/// Errors produced while fetching departures from the upstream provider.
///
/// The retry and circuit-breaker layers only care about the retryability
/// split: timeouts, connection failures and 5xx responses are transient,
/// while 4xx responses and parse failures will not resolve by retrying.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("upstream request timed out: {0}")]
    Timeout(String),
    #[error("upstream server error: HTTP {0}")]
    ServerError(u16),
    #[error("upstream rejected request: HTTP {0}")]
    ClientError(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to parse upstream response: {0}")]
    Parse(String),
    #[error("circuit breaker is open, retry in {cooldown_remaining_ms} ms")]
    CircuitOpen { cooldown_remaining_ms: u64 },
}

impl FetchError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) | FetchError::ServerError(_) => true,
            FetchError::ClientError(_) | FetchError::Parse(_) | FetchError::CircuitOpen { .. } => {
                false
            }
        }
    }
}
