//! Rate limiter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Size of the rolling response-time window used for adaptive pacing.
pub const RESPONSE_TIME_WINDOW: usize = 10;

/// Cap on the backoff exponent so repeated failures cannot overflow the
/// delay computation before the max-delay clamp applies.
pub const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Configuration for per-domain rate limiting behavior.
///
/// Immutable after construction; shared by value into the limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Base delay between requests to the same domain.
    pub default_delay: Duration,
    /// Maximum simultaneous in-flight requests per domain.
    pub max_concurrent_requests: usize,
    /// Fold observed response times into the delay when true.
    pub adaptive_delay_enabled: bool,
    /// Minimum delay (floor).
    pub min_delay: Duration,
    /// Maximum delay (ceiling for backoff and adaptation).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff on failures.
    pub backoff_factor: f64,
    /// Maximum retry attempts advertised to callers.
    pub max_retries: u32,
    /// Honor server-supplied Retry-After values verbatim.
    pub respect_retry_after: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_delay: Duration::from_secs(1),
            max_concurrent_requests: 5,
            adaptive_delay_enabled: true,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_retries: 3,
            respect_retry_after: true,
        }
    }
}
