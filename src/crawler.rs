//! Coordinator gating outbound fetches behind robots.txt compliance,
//! concurrency admission, and adaptive pacing.
//!
//! The crawler does not perform page fetches itself. An external fetch loop
//! calls [`RespectfulCrawler::prepare_request`], performs its own network
//! I/O, and reports the outcome through
//! [`RespectfulCrawler::complete_request`] — which must run exactly once per
//! successful preparation, on every exit path, so the concurrency slot is
//! returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::CrawlerConfig;
use crate::error::{CrawlError, CrawlResult};
use crate::rate_limit::{DomainStats, RateLimiter};
use crate::retry::{RetryPolicy, RetryStats};
use crate::robots::{RobotsFetcher, RobotsTxtCache};

/// Combined statistics across the engine's policies.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlStats {
    pub domains: HashMap<String, DomainStats>,
    pub retries: RetryStats,
}

/// Compliance gate composing the robots cache, rate limiter, and retry
/// policy into a single prepare/complete surface.
#[derive(Debug, Clone)]
pub struct RespectfulCrawler {
    config: CrawlerConfig,
    robots: RobotsTxtCache,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl RespectfulCrawler {
    /// Build a crawler with the default HTTP robots fetcher.
    pub fn new(config: CrawlerConfig) -> CrawlResult<Self> {
        let robots = RobotsTxtCache::with_http(
            &config.user_agent,
            config.request_timeout,
            config.robots_ttl,
        )?;
        Ok(Self::with_robots_fetcher_cache(config, robots))
    }

    /// Build a crawler with a custom robots fetch transport.
    pub fn with_robots_fetcher(config: CrawlerConfig, fetcher: Arc<dyn RobotsFetcher>) -> Self {
        let robots = RobotsTxtCache::new(fetcher, config.robots_ttl);
        Self::with_robots_fetcher_cache(config, robots)
    }

    fn with_robots_fetcher_cache(config: CrawlerConfig, robots: RobotsTxtCache) -> Self {
        let limiter = RateLimiter::new(config.rate_limit.clone());
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            config,
            robots,
            limiter,
            retry,
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.config.user_agent
    }

    pub fn robots(&self) -> &RobotsTxtCache {
        &self.robots
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Peek-only check: robots compliance plus slot availability. Probes a
    /// slot by acquiring and immediately releasing it; reserves nothing.
    pub async fn can_make_request(&self, url: &str) -> bool {
        if !self.robots.can_fetch(url, &self.config.user_agent).await {
            return false;
        }

        if self.limiter.acquire_request_slot(url).await {
            self.limiter.release_request_slot(url).await;
            true
        } else {
            false
        }
    }

    /// Gate a request: robots check, slot acquisition, then the adaptive
    /// pacing wait (extended to the robots crawl-delay when that is longer).
    ///
    /// On success the caller holds a concurrency slot and must call
    /// [`complete_request`](Self::complete_request) exactly once.
    pub async fn prepare_request(&self, url: &str) -> CrawlResult<(bool, Duration)> {
        if !self.robots.can_fetch(url, &self.config.user_agent).await {
            return Err(CrawlError::rate_limited(
                format!("disallowed by robots.txt: {url}"),
                None,
            ));
        }

        if !self.limiter.acquire_request_slot(url).await {
            return Err(CrawlError::rate_limited(
                format!("concurrency limit reached for {url}"),
                None,
            ));
        }

        let robots_delay = self
            .robots
            .get_crawl_delay(url, &self.config.user_agent)
            .await
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(Duration::from_secs_f64);

        let mut waited = self.limiter.wait_for_request(url, None).await;

        // A robots crawl-delay longer than our own pacing extends the wait.
        if let Some(robots_delay) = robots_delay {
            if robots_delay > waited {
                let extra = robots_delay - waited;
                debug!("Extending wait for {} by {:?} (robots crawl-delay)", url, extra);
                tokio::time::sleep(extra).await;
                waited = robots_delay;
            }
        }

        Ok((true, waited))
    }

    /// Report the outcome of a prepared request and release its slot.
    pub async fn complete_request(
        &self,
        url: &str,
        success: bool,
        response_time: Option<Duration>,
    ) {
        if let Some(domain) = RateLimiter::extract_domain(url) {
            if response_time.is_some() {
                self.limiter.calculate_delay(&domain, response_time).await;
            }
            self.limiter.apply_backoff(&domain, !success).await;
        }

        self.limiter.release_request_slot(url).await;
    }

    /// Snapshot of per-domain pacing state plus retry counters.
    pub async fn crawl_stats(&self) -> CrawlStats {
        CrawlStats {
            domains: self.limiter.get_all_stats().await,
            retries: self.retry.get_error_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::rate_limit::RateLimitConfig;
    use async_trait::async_trait;

    /// Serves one fixed robots.txt body for every domain.
    struct FixedRobots(Option<String>);

    #[async_trait]
    impl RobotsFetcher for FixedRobots {
        async fn fetch(&self, _url: &str) -> CrawlResult<Option<String>> {
            Ok(self.0.clone())
        }
    }

    fn test_crawler(robots_body: Option<&str>) -> RespectfulCrawler {
        let config = CrawlerConfig {
            rate_limit: RateLimitConfig {
                default_delay: Duration::from_millis(10),
                min_delay: Duration::from_millis(1),
                max_concurrent_requests: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        RespectfulCrawler::with_robots_fetcher(
            config,
            Arc::new(FixedRobots(robots_body.map(String::from))),
        )
    }

    #[tokio::test]
    async fn test_prepare_denied_by_robots() {
        let crawler = test_crawler(Some("User-agent: *\nDisallow: /private/\n"));

        let err = crawler
            .prepare_request("https://example.com/private/doc")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimit);

        // A denial must not leak a slot
        assert!(crawler.can_make_request("https://example.com/ok").await);
    }

    #[tokio::test]
    async fn test_prepare_denied_when_saturated() {
        let crawler = test_crawler(None);
        let url = "https://example.com/doc";

        crawler.prepare_request(url).await.unwrap();
        crawler.prepare_request(url).await.unwrap();

        let err = crawler.prepare_request(url).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn test_complete_releases_slot() {
        let crawler = test_crawler(None);
        let url = "https://example.com/doc";

        crawler.prepare_request(url).await.unwrap();
        crawler.prepare_request(url).await.unwrap();
        assert!(crawler.prepare_request(url).await.is_err());

        crawler
            .complete_request(url, true, Some(Duration::from_millis(50)))
            .await;

        assert!(crawler.prepare_request(url).await.is_ok());
    }

    #[tokio::test]
    async fn test_can_make_request_reserves_nothing() {
        let crawler = test_crawler(None);
        let url = "https://example.com/doc";

        assert!(crawler.can_make_request(url).await);
        assert!(crawler.can_make_request(url).await);

        // Both slots still available after repeated peeks
        crawler.prepare_request(url).await.unwrap();
        crawler.prepare_request(url).await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_outcome_backs_off() {
        let crawler = test_crawler(None);
        let url = "https://example.com/doc";

        crawler.prepare_request(url).await.unwrap();
        crawler.complete_request(url, false, None).await;

        let stats = crawler.crawl_stats().await;
        let domain = &stats.domains["example.com"];
        assert_eq!(domain.consecutive_failures, 1);
        assert_eq!(domain.failed_requests, 1);
        assert_eq!(domain.active_requests, 0);
    }

    #[tokio::test]
    async fn test_robots_crawl_delay_extends_wait() {
        // 200ms robots delay vs 10ms limiter delay; the robots value wins.
        let crawler = test_crawler(Some("User-agent: *\nCrawl-delay: 0.2\n"));
        let url = "https://example.com/doc";

        let (_, first) = crawler.prepare_request(url).await.unwrap();
        assert!(first >= Duration::from_millis(200));
        crawler.complete_request(url, true, None).await;
    }
}
