//! Generic retry/backoff policy engine.
//!
//! Domain-agnostic: classifies [`crate::error::CrawlError`] values into
//! retryable and permanent failures and drives the retry loop with a
//! pluggable backoff strategy. Used for crawl fetches here, but has no
//! knowledge of HTTP beyond the status code carried by network errors.

mod context;
mod policy;

pub use context::ErrorContext;
pub use policy::{BackoffStrategy, RetryConfig, RetryPolicy, RetryStats};
