use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Cache TTL bounds enforced at load time (seconds).
const MIN_CACHE_TTL_SECS: u64 = 60;
const MAX_CACHE_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    pub line: LineConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// The line served by this deployment and its known station codes.
#[derive(Debug, Clone, Deserialize)]
pub struct LineConfig {
    /// Line used when a request names none (e.g., "WRL")
    pub default_service_id: String,
    /// Valid station codes; requests naming anything else are rejected
    /// before any upstream call.
    pub stations: Vec<String>,
}

/// Metlink OpenData API endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "UpstreamConfig::default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 10)
    #[serde(default = "UpstreamConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    fn default_base_url() -> String {
        "https://api.opendata.metlink.org.nz/v1".to_string()
    }
    fn default_timeout_secs() -> u64 {
        10
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 3)
    #[serde(default = "RetryConfig::default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay in milliseconds; doubles per retry (default: 1000)
    #[serde(default = "RetryConfig::default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            base_delay_ms: Self::default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    fn default_max_attempts() -> u32 {
        3
    }
    fn default_base_delay_ms() -> u64 {
        1000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens (default: 5)
    #[serde(default = "BreakerConfig::default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before trialling again (default: 60)
    #[serde(default = "BreakerConfig::default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Trial calls admitted while half-open (default: 2)
    #[serde(default = "BreakerConfig::default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_failure_threshold(),
            cooldown_secs: Self::default_cooldown_secs(),
            half_open_max_calls: Self::default_half_open_max_calls(),
        }
    }
}

impl BreakerConfig {
    fn default_failure_threshold() -> u32 {
        5
    }
    fn default_cooldown_secs() -> u64 {
        60
    }
    fn default_half_open_max_calls() -> u32 {
        2
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Board cache TTL in seconds, clamped to 60..=600 (default: 120)
    #[serde(default = "CacheConfig::default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: Self::default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    fn default_ttl_secs() -> u64 {
        120
    }

    /// TTL with the configured value clamped to the supported range.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.clamp(MIN_CACHE_TTL_SECS, MAX_CACHE_TTL_SECS))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per client per window (default: 30)
    #[serde(default = "RateLimitConfig::default_limit")]
    pub limit: u32,
    /// Window length in seconds (default: 60)
    #[serde(default = "RateLimitConfig::default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
            window_secs: Self::default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    fn default_limit() -> u32 {
        30
    }
    fn default_window_secs() -> u64 {
        60
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}
