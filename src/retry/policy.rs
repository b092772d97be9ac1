//! Retry policy engine: error classification and retry-loop drivers.
//!
//! Retryability is decided from the error kind and (for network errors)
//! the status code. Severity classification lives on [`CrawlError`] and is
//! observability-only; it never feeds into the retry decision.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CrawlError, CrawlResult, ErrorKind};

use super::context::ErrorContext;

/// How the inter-attempt delay grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Always `base_delay`.
    Fixed,
    /// `attempt * base_delay`.
    Linear,
    /// `base_delay * multiplier^(attempt - 1)`.
    Exponential,
}

/// Configuration for the retry engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub strategy: BackoffStrategy,
    /// Error kinds eligible for retry. Configuration and Validation errors
    /// are systemic rather than transient and are never in this set by
    /// default.
    pub retryable: HashSet<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
            retryable: HashSet::from([ErrorKind::Network, ErrorKind::RateLimit]),
        }
    }
}

impl RetryConfig {
    /// Delay before attempt number `attempt` (1-based), clamped to
    /// `max_delay`. Pure function of the attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay * attempt,
            BackoffStrategy::Exponential => self
                .base_delay
                .mul_f64(self.backoff_multiplier.powi((attempt - 1) as i32)),
        };
        delay.min(self.max_delay)
    }
}

/// Aggregate counters for the lifetime of one policy handle.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RetryStats {
    pub total_errors: u64,
    pub retried_errors: u64,
    pub recovered_errors: u64,
    pub failed_operations: u64,
}

#[derive(Default)]
struct StatsInner {
    total_errors: AtomicU64,
    retried_errors: AtomicU64,
    recovered_errors: AtomicU64,
    failed_operations: AtomicU64,
}

/// Generic retry engine with pluggable backoff.
///
/// Clones share counters, so one policy handle can be distributed across
/// workers and still report aggregate stats.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    stats: Arc<StatsInner>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            stats: Arc::new(StatsInner::default()),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Core retry decision, shared by the async and blocking drivers.
    /// Counts the error; does not sleep.
    fn decide(&self, error: &CrawlError, context: &ErrorContext) -> bool {
        self.stats.total_errors.fetch_add(1, Ordering::Relaxed);

        if !self.config.retryable.contains(&error.kind()) {
            debug!(
                "{} failed with non-retryable {:?}: {}",
                context.operation,
                error.kind(),
                error
            );
            return false;
        }

        if !context.attempts_remaining() {
            debug!(
                "{} exhausted {} attempt(s): {}",
                context.operation, context.max_attempts, error
            );
            return false;
        }

        // Permanent client errors are not worth retrying; 429 is the
        // throttling exception, and no status means a connection-level
        // failure which may well be transient.
        if let CrawlError::Network {
            status: Some(status),
            ..
        } = error
        {
            if (400..500).contains(status) && *status != 429 {
                debug!(
                    "{}: HTTP {} is a permanent client error, not retrying",
                    context.operation, status
                );
                return false;
            }
        }

        self.stats.retried_errors.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Decide whether `error` warrants another attempt.
    ///
    /// Rate-limit errors carrying a Retry-After are honored here: the
    /// handler suspends for that duration before signalling "retry allowed".
    pub async fn handle_error(&self, error: &CrawlError, context: &ErrorContext) -> bool {
        let retry = self.decide(error, context);
        if retry {
            if let CrawlError::RateLimit {
                retry_after: Some(retry_after),
                ..
            } = error
            {
                debug!(
                    "{}: honoring Retry-After of {:?}",
                    context.operation, retry_after
                );
                tokio::time::sleep(*retry_after).await;
            }
        }
        retry
    }

    /// Blocking twin of [`handle_error`](Self::handle_error) with identical
    /// decision logic.
    pub fn handle_error_blocking(&self, error: &CrawlError, context: &ErrorContext) -> bool {
        let retry = self.decide(error, context);
        if retry {
            if let CrawlError::RateLimit {
                retry_after: Some(retry_after),
                ..
            } = error
            {
                std::thread::sleep(*retry_after);
            }
        }
        retry
    }

    /// Run `operation` under this policy, retrying per the configured
    /// strategy. The final error is returned unmodified once attempts are
    /// exhausted or the error is not retryable.
    pub async fn with_retry<T, F, Fut>(
        &self,
        context: &mut ErrorContext,
        mut operation: F,
    ) -> CrawlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CrawlResult<T>>,
    {
        loop {
            match operation().await {
                Ok(value) => {
                    if context.attempt > 1 {
                        self.stats.recovered_errors.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            "{} recovered on attempt {}",
                            context.operation, context.attempt
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    // A Retry-After hint has already elapsed inside
                    // handle_error by the time it signals "retry allowed";
                    // the strategy delay applies on top of it.
                    if !self.handle_error(&error, context).await {
                        self.stats.failed_operations.fetch_add(1, Ordering::Relaxed);
                        return Err(error);
                    }

                    let delay = self.config.delay_for_attempt(context.attempt);
                    warn!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        context.operation, context.attempt, context.max_attempts, error, delay
                    );
                    tokio::time::sleep(delay).await;

                    context.attempt += 1;
                }
            }
        }
    }

    /// Synchronous twin of [`with_retry`](Self::with_retry), for callers
    /// outside an async runtime. Decision logic is identical; delays block
    /// the calling thread.
    pub fn with_retry_blocking<T, F>(
        &self,
        context: &mut ErrorContext,
        mut operation: F,
    ) -> CrawlResult<T>
    where
        F: FnMut() -> CrawlResult<T>,
    {
        loop {
            match operation() {
                Ok(value) => {
                    if context.attempt > 1 {
                        self.stats.recovered_errors.fetch_add(1, Ordering::Relaxed);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.handle_error_blocking(&error, context) {
                        self.stats.failed_operations.fetch_add(1, Ordering::Relaxed);
                        return Err(error);
                    }

                    std::thread::sleep(self.config.delay_for_attempt(context.attempt));
                    context.attempt += 1;
                }
            }
        }
    }

    pub fn get_error_stats(&self) -> RetryStats {
        RetryStats {
            total_errors: self.stats.total_errors.load(Ordering::Relaxed),
            retried_errors: self.stats.retried_errors.load(Ordering::Relaxed),
            recovered_errors: self.stats.recovered_errors.load(Ordering::Relaxed),
            failed_operations: self.stats.failed_operations.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.stats.total_errors.store(0, Ordering::Relaxed);
        self.stats.retried_errors.store(0, Ordering::Relaxed);
        self.stats.recovered_errors.store(0, Ordering::Relaxed);
        self.stats.failed_operations.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("stats", &self.get_error_stats())
            .finish()
    }
}
