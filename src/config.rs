//! Engine-wide configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryConfig;

/// Default TTL for cached robots.txt entries.
pub const DEFAULT_ROBOTS_TTL: Duration = Duration::from_secs(3600);

/// Default timeout for robots.txt fetches.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Top-level configuration for the compliance engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User agent sent on robots.txt fetches and matched against
    /// robots.txt groups.
    pub user_agent: String,
    /// Timeout for robots.txt fetches.
    pub request_timeout: Duration,
    /// How long a cached robots.txt entry stays fresh.
    pub robots_ttl: Duration,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("crawlgate/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            robots_ttl: DEFAULT_ROBOTS_TTL,
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl CrawlerConfig {
    /// Apply environment overrides on top of the current values.
    ///
    /// Recognized variables: `CRAWLGATE_USER_AGENT`,
    /// `CRAWLGATE_REQUEST_TIMEOUT_SECS`, `CRAWLGATE_DEFAULT_DELAY_MS`,
    /// `CRAWLGATE_MAX_CONCURRENT`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(ua) = std::env::var("CRAWLGATE_USER_AGENT") {
            if !ua.is_empty() {
                self.user_agent = ua;
            }
        }
        if let Some(timeout) = secs_from_env("CRAWLGATE_REQUEST_TIMEOUT_SECS") {
            self.request_timeout = timeout;
        }
        if let Some(delay) = millis_from_env("CRAWLGATE_DEFAULT_DELAY_MS") {
            self.rate_limit.default_delay = delay;
        }
        if let Ok(max) = std::env::var("CRAWLGATE_MAX_CONCURRENT") {
            if let Ok(max) = max.parse::<usize>() {
                self.rate_limit.max_concurrent_requests = max;
            }
        }
        self
    }
}

fn secs_from_env(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn millis_from_env(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}
