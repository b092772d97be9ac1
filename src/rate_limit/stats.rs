//! Per-domain request statistics.
//!
//! [`DomainState`] is the internal mutable record owned behind the limiter's
//! per-domain lock; [`DomainStats`] is the read-only snapshot handed to
//! callers.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::config::{RateLimitConfig, RESPONSE_TIME_WINDOW};

/// Read-only snapshot of a domain's rate-limiting state.
#[derive(Debug, Clone, Serialize)]
pub struct DomainStats {
    pub domain: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Recent response times, oldest first (bounded window).
    pub recent_response_times: Vec<Duration>,
    pub average_response_time: Duration,
    pub current_delay: Duration,
    pub consecutive_failures: u32,
    pub active_requests: usize,
}

/// Internal mutable state for one domain.
#[derive(Debug)]
pub(crate) struct DomainState {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Rolling window of recent response times, newest last.
    pub recent_response_times: VecDeque<Duration>,
    pub average_response_time: Duration,
    pub current_delay: Duration,
    pub consecutive_failures: u32,
    pub active_requests: usize,
    pub last_request: Option<Instant>,
}

impl DomainState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            recent_response_times: VecDeque::with_capacity(RESPONSE_TIME_WINDOW),
            average_response_time: Duration::ZERO,
            current_delay: config.default_delay,
            consecutive_failures: 0,
            active_requests: 0,
            last_request: None,
        }
    }

    /// Fold a response time into the bounded window and recompute the average.
    pub fn record_response_time(&mut self, response_time: Duration) {
        if self.recent_response_times.len() >= RESPONSE_TIME_WINDOW {
            self.recent_response_times.pop_front();
        }
        self.recent_response_times.push_back(response_time);

        let total: Duration = self.recent_response_times.iter().sum();
        self.average_response_time = total / self.recent_response_times.len() as u32;
    }

    /// Remaining wait before the next request may be issued at `delay` pacing.
    pub fn time_until_ready(&self) -> Duration {
        match self.last_request {
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn snapshot(&self, domain: &str) -> DomainStats {
        DomainStats {
            domain: domain.to_string(),
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            recent_response_times: self.recent_response_times.iter().copied().collect(),
            average_response_time: self.average_response_time,
            current_delay: self.current_delay,
            consecutive_failures: self.consecutive_failures,
            active_requests: self.active_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_time_window_bounded() {
        let config = RateLimitConfig::default();
        let mut state = DomainState::new(&config);

        for i in 0..15 {
            state.record_response_time(Duration::from_millis(100 + i));
        }

        assert_eq!(state.recent_response_times.len(), RESPONSE_TIME_WINDOW);
        // Oldest samples evicted: window holds 105..=114
        assert_eq!(
            state.recent_response_times.front().copied(),
            Some(Duration::from_millis(105))
        );
    }

    #[test]
    fn test_average_recomputed() {
        let config = RateLimitConfig::default();
        let mut state = DomainState::new(&config);

        state.record_response_time(Duration::from_millis(100));
        state.record_response_time(Duration::from_millis(300));

        assert_eq!(state.average_response_time, Duration::from_millis(200));
    }

    #[test]
    fn test_snapshot_carries_response_window() {
        let config = RateLimitConfig::default();
        let mut state = DomainState::new(&config);

        state.record_response_time(Duration::from_millis(100));
        state.record_response_time(Duration::from_millis(200));

        let snapshot = state.snapshot("example.com");
        assert_eq!(
            snapshot.recent_response_times,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(snapshot.average_response_time, Duration::from_millis(150));
    }

    #[test]
    fn test_time_until_ready_no_prior_request() {
        let config = RateLimitConfig::default();
        let state = DomainState::new(&config);
        assert_eq!(state.time_until_ready(), Duration::ZERO);
    }

    #[test]
    fn test_time_until_ready_deficit() {
        let config = RateLimitConfig::default();
        let mut state = DomainState::new(&config);
        state.current_delay = Duration::from_secs(10);
        state.last_request = Some(Instant::now());

        let remaining = state.time_until_ready();
        assert!(remaining > Duration::from_secs(9));
        assert!(remaining <= Duration::from_secs(10));
    }
}
