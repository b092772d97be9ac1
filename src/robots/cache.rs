//! TTL-cached robots.txt lookups per domain.
//!
//! The fetch capability is behind [`RobotsFetcher`] so tests (and embedders
//! with their own transport) can supply content without network access.
//! Fetch failures degrade to a permissive entry; they never surface as
//! errors to callers, and never block crawling on their own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CrawlError, CrawlResult};

use super::parser::RobotsTxtInfo;

/// Bounded-timeout fetch of a robots.txt body.
///
/// `Ok(None)` means the server answered 404 (no robots file); transport
/// failures and other error statuses are `Err` and are treated the same
/// way by the cache: permissive.
#[async_trait]
pub trait RobotsFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> CrawlResult<Option<String>>;
}

/// Default fetcher backed by reqwest with a bounded timeout.
pub struct HttpRobotsFetcher {
    client: reqwest::Client,
}

impl HttpRobotsFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> CrawlResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| CrawlError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RobotsFetcher for HttpRobotsFetcher {
    async fn fetch(&self, url: &str) -> CrawlResult<Option<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CrawlError::connection(format!("fetching {url}: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CrawlError::network(
                response.status().as_u16(),
                format!("fetching {url}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::connection(format!("reading {url}: {e}")))?;
        Ok(Some(body))
    }
}

/// Per-domain robots.txt cache with a fixed TTL.
#[derive(Clone)]
pub struct RobotsTxtCache {
    fetcher: Arc<dyn RobotsFetcher>,
    ttl: Duration,
    cache: Arc<RwLock<HashMap<String, RobotsTxtInfo>>>,
}

impl RobotsTxtCache {
    pub fn new(fetcher: Arc<dyn RobotsFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Convenience constructor with the HTTP fetcher.
    pub fn with_http(user_agent: &str, timeout: Duration, ttl: Duration) -> CrawlResult<Self> {
        Ok(Self::new(
            Arc::new(HttpRobotsFetcher::new(user_agent, timeout)?),
            ttl,
        ))
    }

    fn domain_of(url: &str) -> CrawlResult<String> {
        let parsed = Url::parse(url)
            .map_err(|e| CrawlError::Validation(format!("invalid URL {url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CrawlError::Validation(format!("URL has no host: {url}")))?;
        Ok(match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// Robots info for the URL's domain, fetching when the cached entry is
    /// missing, expired, or a refresh is forced.
    ///
    /// Errors only for URLs with no derivable domain; fetch problems yield
    /// a permissive inaccessible entry instead.
    pub async fn get_robots_info(
        &self,
        url: &str,
        force_refresh: bool,
    ) -> CrawlResult<RobotsTxtInfo> {
        let domain = Self::domain_of(url)?;

        if !force_refresh {
            let cache = self.cache.read().await;
            if let Some(info) = cache.get(&domain) {
                let age = (Utc::now() - info.fetched_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if age < self.ttl {
                    return Ok(info.clone());
                }
            }
        }

        let robots_url = format!("https://{domain}/robots.txt");
        let info = match self.fetcher.fetch(&robots_url).await {
            Ok(Some(content)) => RobotsTxtInfo::parse(&robots_url, &content),
            Ok(None) => {
                debug!("No robots.txt at {} (404), allowing all", robots_url);
                RobotsTxtInfo::inaccessible(&robots_url)
            }
            Err(e) => {
                debug!("Failed to fetch {}: {}, allowing all", robots_url, e);
                RobotsTxtInfo::inaccessible(&robots_url)
            }
        };

        let mut cache = self.cache.write().await;
        cache.insert(domain, info.clone());
        Ok(info)
    }

    /// Whether `user_agent` may fetch `url`.
    ///
    /// Permissive when the robots file is missing or unreachable;
    /// conservative (`false`) when the URL itself cannot be evaluated.
    pub async fn can_fetch(&self, url: &str, user_agent: &str) -> bool {
        match self.get_robots_info(url, false).await {
            Ok(info) => info.is_allowed(url, user_agent),
            Err(e) => {
                warn!("Cannot evaluate robots rules for {}: {}", url, e);
                false
            }
        }
    }

    /// Crawl delay for the URL's domain and agent, in seconds.
    pub async fn get_crawl_delay(&self, url: &str, user_agent: &str) -> Option<f64> {
        let info = self.get_robots_info(url, false).await.ok()?;
        info.crawl_delay_for(user_agent)
    }

    /// Subset of `urls` that `user_agent` is allowed to fetch.
    pub async fn filter_urls(&self, urls: &[String], user_agent: &str) -> Vec<String> {
        let mut allowed = Vec::with_capacity(urls.len());
        for url in urls {
            if self.can_fetch(url, user_agent).await {
                allowed.push(url.clone());
            }
        }
        allowed
    }

    /// Sitemap URLs advertised by the domain's robots.txt.
    pub async fn get_sitemaps(&self, url: &str) -> Vec<String> {
        match self.get_robots_info(url, false).await {
            Ok(info) => info.sitemap_urls,
            Err(_) => Vec::new(),
        }
    }

    /// Evict every cached entry.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

impl std::fmt::Debug for RobotsTxtCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotsTxtCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
