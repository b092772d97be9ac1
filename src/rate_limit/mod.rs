//! Rate limiting for outbound crawl requests.
//!
//! Provides adaptive per-domain rate limiting:
//! - pacing derived from observed response latency
//! - exponential backoff on failures, gradual recovery on success
//! - a non-blocking per-domain concurrency cap
//!
//! State is in-process only and not persisted across restarts.

mod config;
mod limiter;
mod stats;

pub use config::{RateLimitConfig, MAX_BACKOFF_EXPONENT, RESPONSE_TIME_WINDOW};
pub use limiter::RateLimiter;
pub use stats::DomainStats;

/// Parse a Retry-After header value (whole seconds form).
/// Returns the duration to wait, or None if the value is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<std::time::Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(std::time::Duration::from_secs)
}
