//! Adaptive per-domain rate limiter.
//!
//! Tracks request statistics per domain and derives pacing from observed
//! response times: slow origins get longer spacing, failures trigger
//! exponential backoff, successes decay the delay back toward the default.
//! A per-domain counting slot bounds simultaneous in-flight requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::Url;

use super::config::{RateLimitConfig, MAX_BACKOFF_EXPONENT};
use super::stats::{DomainState, DomainStats};

/// Adaptive rate limiter keyed by domain.
///
/// Per-domain state lives behind its own lock so operations on unrelated
/// domains never serialize against each other; only the first reference to
/// a domain takes the map's write lock.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    domains: Arc<RwLock<HashMap<String, Arc<Mutex<DomainState>>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Extract the rate-limiting key (host, with port when present) from a URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_string();
        Some(match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        })
    }

    /// Get or lazily create the state for a domain.
    async fn domain_state(&self, domain: &str) -> Arc<Mutex<DomainState>> {
        {
            let domains = self.domains.read().await;
            if let Some(state) = domains.get(domain) {
                return Arc::clone(state);
            }
        }

        let mut domains = self.domains.write().await;
        Arc::clone(
            domains
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(DomainState::new(&self.config)))),
        )
    }

    /// Recompute the adaptive delay in place. Shared by `calculate_delay`
    /// and `wait_for_request` so both observe identical pacing.
    fn update_delay(&self, state: &mut DomainState, response_time: Option<Duration>) -> Duration {
        if !self.config.adaptive_delay_enabled {
            return state.current_delay;
        }

        if let Some(rt) = response_time {
            state.record_response_time(rt);
        }

        let target = self.config.default_delay + state.average_response_time / 2;
        state.current_delay = target.clamp(self.config.min_delay, self.config.max_delay);
        state.current_delay
    }

    /// Current pacing delay for a domain, folding in an observed response
    /// time when adaptive mode is enabled.
    pub async fn calculate_delay(
        &self,
        domain: &str,
        response_time: Option<Duration>,
    ) -> Duration {
        let state = self.domain_state(domain).await;
        let mut state = state.lock().await;
        self.update_delay(&mut state, response_time)
    }

    /// Record a request outcome: failures grow the delay exponentially,
    /// successes decay it 20% toward the default.
    pub async fn apply_backoff(&self, domain: &str, is_failure: bool) {
        let state = self.domain_state(domain).await;
        let mut state = state.lock().await;

        state.total_requests += 1;

        if is_failure {
            state.consecutive_failures += 1;
            state.failed_requests += 1;

            let exponent = state.consecutive_failures.min(MAX_BACKOFF_EXPONENT);
            let factor = self.config.backoff_factor.powi(exponent as i32);
            state.current_delay = state
                .current_delay
                .mul_f64(factor)
                .min(self.config.max_delay);

            warn!(
                "Backing off {} after {} consecutive failure(s): delay now {:?}",
                domain, state.consecutive_failures, state.current_delay
            );
        } else {
            state.consecutive_failures = 0;
            state.successful_requests += 1;

            // Decay gradually rather than snapping to the default, so a
            // single success after heavy backoff does not cause oscillation.
            if state.current_delay > self.config.default_delay {
                let excess = state.current_delay - self.config.default_delay;
                state.current_delay = self.config.default_delay + excess.mul_f64(0.8);
                debug!(
                    "Success on {}: delay decayed to {:?}",
                    domain, state.current_delay
                );
            }
        }
    }

    /// Try to claim an in-flight slot for the URL's domain.
    ///
    /// Non-blocking: returns `false` immediately when the domain is at its
    /// concurrency cap (or the URL has no parseable domain). Queuing policy
    /// belongs to the caller.
    pub async fn acquire_request_slot(&self, url: &str) -> bool {
        let Some(domain) = Self::extract_domain(url) else {
            warn!("Cannot rate-limit URL without a host: {}", url);
            return false;
        };

        let state = self.domain_state(&domain).await;
        let mut state = state.lock().await;

        if state.active_requests < self.config.max_concurrent_requests {
            state.active_requests += 1;
            true
        } else {
            debug!(
                "Concurrency cap reached for {} ({} active)",
                domain, state.active_requests
            );
            false
        }
    }

    /// Release an in-flight slot. Saturates at zero, so releasing more
    /// times than acquired is silently ignored.
    pub async fn release_request_slot(&self, url: &str) {
        let Some(domain) = Self::extract_domain(url) else {
            return;
        };

        let state = self.domain_state(&domain).await;
        let mut state = state.lock().await;
        state.active_requests = state.active_requests.saturating_sub(1);
    }

    /// Suspend until the domain's pacing delay has elapsed since its last
    /// request, then stamp the request time. Returns the actual wait.
    pub async fn wait_for_request(
        &self,
        url: &str,
        response_time: Option<Duration>,
    ) -> Duration {
        let Some(domain) = Self::extract_domain(url) else {
            return Duration::ZERO;
        };

        let wait = {
            let state = self.domain_state(&domain).await;
            let mut state = state.lock().await;
            self.update_delay(&mut state, response_time);
            let wait = state.time_until_ready();
            // Stamp where the request will actually start, so concurrent
            // waiters on the same domain space out rather than stampede.
            state.last_request = Some(Instant::now() + wait);
            wait
        };

        if wait > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }

        wait
    }

    /// Delay to apply before retry number `attempt` against a domain.
    ///
    /// A server-supplied Retry-After wins verbatim when configured to be
    /// respected; otherwise exponential backoff from the domain's current
    /// delay, capped at the maximum.
    pub async fn get_retry_delay(
        &self,
        domain: &str,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> Duration {
        if self.config.respect_retry_after {
            if let Some(retry_after) = retry_after {
                return retry_after;
            }
        }

        let state = self.domain_state(domain).await;
        let state = state.lock().await;
        state
            .current_delay
            .mul_f64(self.config.backoff_factor.powi(attempt as i32))
            .min(self.config.max_delay)
    }

    /// Snapshot one domain's statistics, if it has been seen.
    pub async fn get_domain_stats(&self, domain: &str) -> Option<DomainStats> {
        let domains = self.domains.read().await;
        let state = domains.get(domain)?;
        let state = state.lock().await;
        Some(state.snapshot(domain))
    }

    /// Snapshot statistics for every tracked domain.
    pub async fn get_all_stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.read().await;
        let mut stats = HashMap::with_capacity(domains.len());
        for (domain, state) in domains.iter() {
            let state = state.lock().await;
            stats.insert(domain.clone(), state.snapshot(domain));
        }
        stats
    }

    /// Drop all accumulated state for a domain.
    pub async fn reset_domain(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        domains.remove(domain);
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
