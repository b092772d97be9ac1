//! crawlgate - crawl compliance and resilience engine.
//!
//! Governs how and when an automated web client may issue requests to
//! remote origins. Three cooperating policies — a domain-scoped adaptive
//! rate limiter, a robots.txt compliance cache, and a generic retry/backoff
//! engine — are composed by [`RespectfulCrawler`] into a single gate:
//! "may I fetch this URL now", "here is the outcome".
//!
//! The engine performs no page fetching itself (its only HTTP use is
//! robots.txt retrieval) and keeps no state across process restarts.

pub mod config;
pub mod crawler;
pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod robots;

pub use config::CrawlerConfig;
pub use crawler::{CrawlStats, RespectfulCrawler};
pub use error::{CrawlError, CrawlResult, ErrorKind, ErrorSeverity};
pub use rate_limit::{DomainStats, RateLimitConfig, RateLimiter};
pub use retry::{BackoffStrategy, ErrorContext, RetryConfig, RetryPolicy, RetryStats};
pub use robots::{RobotsFetcher, RobotsTxtCache, RobotsTxtInfo, RobotsTxtRule};
