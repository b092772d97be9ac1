//! Line-oriented robots.txt parsing and rule evaluation.
//!
//! The grammar is deliberately simple: a loop over lines tracking the
//! current `User-agent:` group. Evaluation follows Robots Exclusion
//! Protocol precedence: longest matching path wins, Allow beats Disallow
//! on a tie, and rules for the exact agent shadow the `*` group.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use url::Url;

use crate::error::{CrawlError, CrawlResult};

/// Directive carried by a single robots.txt rule line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RobotsDirective {
    Allow,
    Disallow,
    CrawlDelay,
}

/// One parsed rule line, tagged with the user-agent group it appeared under.
#[derive(Debug, Clone, Serialize)]
pub struct RobotsTxtRule {
    pub user_agent: String,
    pub directive: RobotsDirective,
    pub value: String,
}

/// Parsed robots.txt for one domain.
#[derive(Debug, Clone, Serialize)]
pub struct RobotsTxtInfo {
    /// URL the file was fetched from.
    pub url: String,
    /// Raw file content (empty when inaccessible).
    pub content: String,
    /// File-level crawl delay in seconds. The last Crawl-delay line
    /// anywhere in the file wins, regardless of group.
    pub crawl_delay: Option<f64>,
    /// Raw Request-rate value, if present.
    pub request_rate: Option<String>,
    pub sitemap_urls: Vec<String>,
    pub rules: Vec<RobotsTxtRule>,
    pub fetched_at: DateTime<Utc>,
    /// False when the file could not be fetched; evaluation is then
    /// permissive for every path.
    pub accessible: bool,
}

impl RobotsTxtInfo {
    /// A permissive placeholder for domains whose robots.txt is missing or
    /// unreachable. Absence of a robots file never blocks crawling.
    pub fn inaccessible(url: &str) -> Self {
        Self {
            url: url.to_string(),
            content: String::new(),
            crawl_delay: None,
            request_rate: None,
            sitemap_urls: Vec::new(),
            rules: Vec::new(),
            fetched_at: Utc::now(),
            accessible: false,
        }
    }

    /// Parse robots.txt content fetched from `url`.
    pub fn parse(url: &str, content: &str) -> Self {
        let mut info = Self {
            url: url.to_string(),
            content: content.to_string(),
            crawl_delay: None,
            request_rate: None,
            sitemap_urls: Vec::new(),
            rules: Vec::new(),
            fetched_at: Utc::now(),
            accessible: true,
        };

        let mut current_agent = "*".to_string();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            // Strip trailing inline comments
            let value = value.split('#').next().unwrap_or("").trim().to_string();

            match key.as_str() {
                "user-agent" => {
                    current_agent = value;
                }
                "allow" => info.rules.push(RobotsTxtRule {
                    user_agent: current_agent.clone(),
                    directive: RobotsDirective::Allow,
                    value,
                }),
                "disallow" => info.rules.push(RobotsTxtRule {
                    user_agent: current_agent.clone(),
                    directive: RobotsDirective::Disallow,
                    value,
                }),
                "crawl-delay" => {
                    if let Ok(delay) = value.parse::<f64>() {
                        info.crawl_delay = Some(delay);
                    }
                    info.rules.push(RobotsTxtRule {
                        user_agent: current_agent.clone(),
                        directive: RobotsDirective::CrawlDelay,
                        value,
                    });
                }
                "request-rate" => {
                    info.request_rate = Some(value);
                }
                "sitemap" => {
                    if !value.is_empty() {
                        info.sitemap_urls.push(value);
                    }
                }
                _ => {}
            }
        }

        info
    }

    /// Whether `user_agent` may fetch `url` under this file's rules.
    ///
    /// Inaccessible files are permissive (missing robots.txt never blocks);
    /// a failure while evaluating parsed content is conservative and blocks.
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if !self.accessible {
            return true;
        }

        match self.evaluate(url, user_agent) {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!("robots.txt evaluation failed for {}: {}", url, e);
                false
            }
        }
    }

    fn evaluate(&self, url: &str, user_agent: &str) -> CrawlResult<bool> {
        let parsed =
            Url::parse(url).map_err(|e| CrawlError::Parsing(format!("invalid URL {url}: {e}")))?;
        let path = match parsed.query() {
            Some(q) => format!("{}?{}", parsed.path(), q),
            None => parsed.path().to_string(),
        };

        let group = self.select_group(user_agent);

        // Longest matching path wins; on a tie, Allow beats Disallow.
        let mut best: Option<(usize, bool)> = None;
        for rule in group {
            let allow = match rule.directive {
                RobotsDirective::Allow => true,
                RobotsDirective::Disallow => false,
                RobotsDirective::CrawlDelay => continue,
            };
            // An empty path value matches nothing ("Disallow:" allows all).
            if rule.value.is_empty() || !path.starts_with(&rule.value) {
                continue;
            }
            let len = rule.value.len();
            best = match best {
                None => Some((len, allow)),
                Some((best_len, best_allow)) => {
                    if len > best_len || (len == best_len && allow && !best_allow) {
                        Some((len, allow))
                    } else {
                        Some((best_len, best_allow))
                    }
                }
            };
        }

        Ok(best.map(|(_, allow)| allow).unwrap_or(true))
    }

    /// Path rules for the most specific matching group: the exact agent's
    /// rules when it has any, otherwise the `*` group.
    fn select_group(&self, user_agent: &str) -> Vec<&RobotsTxtRule> {
        let exact: Vec<&RobotsTxtRule> = self
            .rules
            .iter()
            .filter(|r| r.user_agent != "*" && agent_matches(&r.user_agent, user_agent))
            .filter(|r| r.directive != RobotsDirective::CrawlDelay)
            .collect();

        if !exact.is_empty() {
            return exact;
        }

        self.rules
            .iter()
            .filter(|r| r.user_agent == "*" && r.directive != RobotsDirective::CrawlDelay)
            .collect()
    }

    /// Crawl delay for `user_agent`: exact-agent rule first, then the `*`
    /// group's rule, then the file-level value.
    pub fn crawl_delay_for(&self, user_agent: &str) -> Option<f64> {
        let rule_delay = |wildcard: bool| -> Option<f64> {
            self.rules
                .iter()
                .filter(|r| r.directive == RobotsDirective::CrawlDelay)
                .filter(|r| {
                    if wildcard {
                        r.user_agent == "*"
                    } else {
                        r.user_agent != "*" && agent_matches(&r.user_agent, user_agent)
                    }
                })
                .filter_map(|r| r.value.parse::<f64>().ok())
                .next_back()
        };

        rule_delay(false)
            .or_else(|| rule_delay(true))
            .or(self.crawl_delay)
    }
}

/// Case-insensitive user-agent match: a group applies when its token
/// occurs within the client's product token.
fn agent_matches(rule_agent: &str, user_agent: &str) -> bool {
    if rule_agent.is_empty() {
        return false;
    }
    user_agent
        .to_lowercase()
        .contains(&rule_agent.to_lowercase())
}
