//! Context passed through a retried operation.

use std::collections::HashMap;
use std::time::Instant;

/// Caller-owned description of an operation being retried.
///
/// The policy engine reads this but never mutates `attempt`; the retry
/// driver increments it between iterations.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Human-readable operation name for logging.
    pub operation: String,
    pub url: Option<String>,
    /// Current attempt number, starting at 1.
    pub attempt: u32,
    pub max_attempts: u32,
    pub start_time: Instant,
    /// Free-form metadata carried alongside the operation.
    pub metadata: HashMap<String, String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            operation: operation.into(),
            url: None,
            attempt: 1,
            max_attempts,
            start_time: Instant::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether another attempt is still within budget.
    pub fn attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }
}
