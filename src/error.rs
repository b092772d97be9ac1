//! Error taxonomy for crawl operations.
//!
//! The retry engine decides retryability from [`ErrorKind`] plus the status
//! code carried by network errors. Severity is derived separately and is
//! purely for logging and reporting; it never influences retry decisions.

use std::time::Duration;

/// Result type for crawl operations.
pub type CrawlResult<T> = Result<T, CrawlError>;

/// Errors produced while gating, fetching, or validating crawl requests.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CrawlError {
    /// Transport or HTTP-level failure. `status` is `None` for
    /// connection-level failures (DNS, timeout, refused).
    #[error("network error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Network {
        status: Option<u16>,
        message: String,
    },

    #[error("parse error: {0}")]
    Parsing(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// The server or our own pacing refused the request for now.
    #[error("rate limited: {message}")]
    RateLimit {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Extracted content scored below the caller's quality threshold.
    #[error("quality {quality_score:.2} below threshold {threshold:.2}")]
    Quality { quality_score: f64, threshold: f64 },
}

/// Discriminant of [`CrawlError`], used for retryable-set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    Network,
    Parsing,
    Validation,
    Configuration,
    RateLimit,
    Quality,
}

/// Coarse severity bucket, derived deterministically from the error kind
/// and (for network errors) the status-code bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CrawlError {
    /// Shorthand for a network error with an HTTP status.
    pub fn network(status: u16, message: impl Into<String>) -> Self {
        CrawlError::Network {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Shorthand for a connection-level failure with no status.
    pub fn connection(message: impl Into<String>) -> Self {
        CrawlError::Network {
            status: None,
            message: message.into(),
        }
    }

    /// Shorthand for a rate-limit error carrying an optional Retry-After.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        CrawlError::RateLimit {
            retry_after,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CrawlError::Network { .. } => ErrorKind::Network,
            CrawlError::Parsing(_) => ErrorKind::Parsing,
            CrawlError::Validation(_) => ErrorKind::Validation,
            CrawlError::Configuration(_) => ErrorKind::Configuration,
            CrawlError::RateLimit { .. } => ErrorKind::RateLimit,
            CrawlError::Quality { .. } => ErrorKind::Quality,
        }
    }

    /// Severity for logging and reporting. 429/503-style throttling is
    /// routine operation for a crawler, so rate limits rank lowest;
    /// configuration problems are fatal to the calling operation.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CrawlError::Configuration(_) => ErrorSeverity::Critical,
            CrawlError::Validation(_) => ErrorSeverity::High,
            CrawlError::Network { status, .. } => match status {
                Some(s) if (400..500).contains(s) => ErrorSeverity::Medium,
                _ => ErrorSeverity::High,
            },
            CrawlError::Parsing(_) | CrawlError::Quality { .. } => ErrorSeverity::Medium,
            CrawlError::RateLimit { .. } => ErrorSeverity::Low,
        }
    }

    /// Whether a quality failure is close enough to the threshold to keep.
    /// Scores above 30% of the threshold are accepted as degraded-but-usable;
    /// anything lower counts as a failed extraction.
    pub fn quality_acceptable(&self) -> bool {
        match self {
            CrawlError::Quality {
                quality_score,
                threshold,
            } => *quality_score > 0.3 * threshold,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            CrawlError::network(500, "boom").kind(),
            ErrorKind::Network
        );
        assert_eq!(
            CrawlError::Configuration("bad".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            CrawlError::rate_limited("slow down", None).kind(),
            ErrorKind::RateLimit
        );
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(
            CrawlError::Configuration("bad".into()).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            CrawlError::network(404, "gone").severity(),
            ErrorSeverity::Medium
        );
        assert_eq!(
            CrawlError::network(503, "busy").severity(),
            ErrorSeverity::High
        );
        assert_eq!(
            CrawlError::connection("refused").severity(),
            ErrorSeverity::High
        );
        assert_eq!(
            CrawlError::rate_limited("throttled", None).severity(),
            ErrorSeverity::Low
        );
    }

    #[test]
    fn test_quality_policy() {
        let close = CrawlError::Quality {
            quality_score: 0.4,
            threshold: 1.0,
        };
        assert!(close.quality_acceptable());

        let far = CrawlError::Quality {
            quality_score: 0.2,
            threshold: 1.0,
        };
        assert!(!far.quality_acceptable());

        // Exactly at 30% is not acceptable
        let edge = CrawlError::Quality {
            quality_score: 0.3,
            threshold: 1.0,
        };
        assert!(!edge.quality_acceptable());
    }

    #[test]
    fn test_display_includes_status() {
        let err = CrawlError::network(429, "too many requests");
        assert!(err.to_string().contains("429"));
    }
}
