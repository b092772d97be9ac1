//! End-to-end tests of the compliance gate: robots rules, concurrency
//! admission, pacing, and retry behavior working together.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crawlgate::robots::RobotsFetcher;
use crawlgate::{
    CrawlError, CrawlResult, CrawlerConfig, ErrorContext, ErrorKind, RateLimitConfig,
    RespectfulCrawler, RetryConfig,
};

struct FixedRobots(Option<String>);

#[async_trait]
impl RobotsFetcher for FixedRobots {
    async fn fetch(&self, _url: &str) -> CrawlResult<Option<String>> {
        Ok(self.0.clone())
    }
}

fn crawler_with(robots_body: Option<&str>, max_concurrent: usize) -> RespectfulCrawler {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let config = CrawlerConfig {
        rate_limit: RateLimitConfig {
            default_delay: Duration::from_millis(10),
            min_delay: Duration::from_millis(1),
            max_concurrent_requests: max_concurrent,
            ..Default::default()
        },
        retry: RetryConfig {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
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
async fn gate_flow_allows_complies_and_reports() {
    let crawler = crawler_with(
        Some("User-agent: *\nDisallow: /admin/\nSitemap: https://example.com/sitemap.xml\n"),
        2,
    );

    assert!(!crawler.can_make_request("https://example.com/admin/panel").await);
    assert!(crawler.can_make_request("https://example.com/docs/a").await);

    let (ok, _waited) = crawler
        .prepare_request("https://example.com/docs/a")
        .await
        .unwrap();
    assert!(ok);

    crawler
        .complete_request(
            "https://example.com/docs/a",
            true,
            Some(Duration::from_millis(30)),
        )
        .await;

    let stats = crawler.crawl_stats().await;
    let domain = &stats.domains["example.com"];
    assert_eq!(domain.total_requests, 1);
    assert_eq!(domain.successful_requests, 1);
    assert_eq!(domain.active_requests, 0);

    let sitemaps = crawler.robots().get_sitemaps("https://example.com/").await;
    assert_eq!(sitemaps, vec!["https://example.com/sitemap.xml".to_string()]);

    // Stats snapshots are serializable for reporting
    let json = serde_json::to_string(&stats).unwrap();
    assert!(json.contains("example.com"));
}

#[tokio::test]
async fn concurrent_tasks_respect_the_domain_cap() {
    let crawler = crawler_with(None, 2);
    let crawler = Arc::new(crawler);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let crawler = Arc::clone(&crawler);
        handles.push(tokio::spawn(async move {
            crawler
                .limiter()
                .acquire_request_slot("https://example.com/doc")
                .await
        }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        } else {
            rejected += 1;
        }
    }

    assert_eq!(admitted, 2);
    assert_eq!(rejected, 1);
}

#[tokio::test]
async fn unrelated_domains_do_not_contend() {
    let crawler = crawler_with(None, 1);

    assert!(crawler.prepare_request("https://a.example.com/x").await.is_ok());
    // a.example.com is saturated, but b.example.com admits immediately
    assert!(crawler.prepare_request("https://a.example.com/y").await.is_err());
    assert!(crawler.prepare_request("https://b.example.com/x").await.is_ok());
}

#[tokio::test]
async fn repeated_failures_back_off_and_recovery_decays() {
    let crawler = crawler_with(None, 5);
    let url = "https://flaky.example.com/doc";

    let mut last_delay = Duration::ZERO;
    for _ in 0..4 {
        crawler.prepare_request(url).await.unwrap();
        crawler.complete_request(url, false, None).await;

        let stats = crawler.crawl_stats().await;
        let delay = stats.domains["flaky.example.com"].current_delay;
        assert!(delay >= last_delay);
        last_delay = delay;
    }

    crawler.prepare_request(url).await.unwrap();
    crawler.complete_request(url, true, None).await;

    let stats = crawler.crawl_stats().await;
    let domain = &stats.domains["flaky.example.com"];
    assert_eq!(domain.consecutive_failures, 0);
    assert!(domain.current_delay < last_delay);
}

#[tokio::test]
async fn retry_engine_drives_a_flaky_fetch_through_the_gate() {
    let crawler = crawler_with(None, 5);
    let url = "https://example.com/doc";

    let attempts = Arc::new(AtomicU32::new(0));
    let retry = crawler.retry_policy().clone();

    let counter = attempts.clone();
    let crawler_ref = &crawler;
    let mut ctx = ErrorContext::new("fetch document", 3).with_url(url);
    let result: CrawlResult<&str> = retry
        .with_retry(&mut ctx, move || {
            let counter = counter.clone();
            async move {
                crawler_ref.prepare_request(url).await?;
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                // Simulated fetch: two server errors, then success
                let outcome = if attempt < 2 {
                    Err(CrawlError::network(503, "service unavailable"))
                } else {
                    Ok("body")
                };
                crawler_ref
                    .complete_request(url, outcome.is_ok(), Some(Duration::from_millis(10)))
                    .await;
                outcome
            }
        })
        .await;

    assert_eq!(result.unwrap(), "body");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let stats = crawler.crawl_stats().await;
    assert_eq!(stats.retries.total_errors, 2);
    assert_eq!(stats.retries.retried_errors, 2);
    assert_eq!(stats.retries.recovered_errors, 1);

    let domain = &stats.domains["example.com"];
    assert_eq!(domain.total_requests, 3);
    assert_eq!(domain.failed_requests, 2);
    assert_eq!(domain.active_requests, 0);
}

#[tokio::test]
async fn robots_denial_is_a_rate_limit_error_and_not_retried_into_compliance() {
    let crawler = crawler_with(Some("User-agent: *\nDisallow: /\n"), 2);

    let err = crawler
        .prepare_request("https://example.com/anything")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimit);

    // No slot was taken by the denial
    let stats = crawler.crawl_stats().await;
    assert!(stats
        .domains
        .get("example.com")
        .map(|d| d.active_requests == 0)
        .unwrap_or(true));
}

#[tokio::test]
async fn filter_urls_through_the_crawler_surface() {
    let crawler = crawler_with(Some("User-agent: *\nDisallow: /private/\n"), 2);

    let urls = vec![
        "https://example.com/a".to_string(),
        "https://example.com/private/b".to_string(),
    ];
    let allowed = crawler
        .robots()
        .filter_urls(&urls, crawler.user_agent())
        .await;
    assert_eq!(allowed, vec!["https://example.com/a".to_string()]);
}

#[tokio::test]
async fn missing_robots_never_blocks() {
    let crawler = crawler_with(None, 2);

    assert!(crawler.can_make_request("https://example.com/anything").await);
    let (ok, _) = crawler
        .prepare_request("https://example.com/anything")
        .await
        .unwrap();
    assert!(ok);
    crawler
        .complete_request("https://example.com/anything", true, None)
        .await;
}
