//! Configuration types for the Harvest SDK.

use rand::Rng;
use std::time::Duration;
use url::Url;

/// Default primary StakeKit host.
pub const DEFAULT_PRIMARY_URL: &str = "https://api.stakek.it/v2";
/// Default fallback host, tried when the primary does not know a resource.
pub const DEFAULT_FALLBACK_URL: &str = "https://api.yield.xyz/v1";
/// Default per-attempt request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Configuration for the StakeKit client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the primary host.
    pub primary_url: Url,
    /// Base URL of the fallback host.
    pub fallback_url: Url,
    /// API key sent as `X-API-KEY`.
    pub api_key: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Retry configuration.
    pub retry_config: RetryConfig,
}

impl ClientConfig {
    /// Create a configuration against the default hosts.
    pub fn new(api_key: impl Into<String>) -> Result<Self, url::ParseError> {
        Ok(Self {
            primary_url: Url::parse(DEFAULT_PRIMARY_URL)?,
            fallback_url: Url::parse(DEFAULT_FALLBACK_URL)?,
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            retry_config: RetryConfig::default(),
        })
    }
}

/// Configuration for retry and fallback behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries per host.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the random jitter added to each backoff.
    pub max_jitter: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// HTTP status codes to retry on.
    pub retry_on_status_codes: Vec<u16>,
    /// Primary-host status codes that trigger one hop to the fallback host.
    pub fallback_on_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_jitter: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            retry_on_status_codes: vec![408, 425, 429, 500, 502, 503, 504],
            fallback_on_status_codes: vec![404, 204],
        }
    }
}

impl RetryConfig {
    /// Create a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Keep the retry budget but shrink every delay to `delay` without jitter.
    pub fn with_fixed_delay(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_jitter: Duration::ZERO,
            backoff_multiplier: 1.0,
            ..Default::default()
        }
    }

    /// Deterministic part of the backoff for a given attempt.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_ms =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(backoff_ms as u64)
    }

    /// Random jitter in `[0, max_jitter)`.
    pub fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }

    /// Full sleep before retrying after `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff_for_attempt(attempt) + self.jitter()
    }

    /// Check if a status code should trigger a retry.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status_codes.contains(&status)
    }

    /// Check if a primary-host status code should trigger the fallback hop.
    pub fn should_fallback_status(&self, status: u16) -> bool {
        self.fallback_on_status_codes.contains(&status)
    }
}
