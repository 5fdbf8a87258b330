//! Rate-limited scholar search client and the source seam the pipeline
//! fans out over

mod client;
mod parse;

pub use client::{SerperScholarClient, SearchClientConfig};
pub use parse::{extract_doi, normalize_title, parse_publication_info};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::models::{RawPaper, SearchStrategy};

/// Errors that can occur while talking to a search provider
#[derive(Debug, Error, Clone)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Request(Arc<reqwest::Error>),

    /// 401/403: never retried, always surfaced
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Transient class (429/5xx/timeout) that survived every retry
    #[error("transient failure persisted after {attempts} attempts: {message}")]
    TransientExhausted { attempts: u32, message: String },

    /// HTTP 200 carrying a provider-level error field
    #[error("provider error: {0}")]
    Provider(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Request(Arc::new(err))
    }
}

impl SearchError {
    /// Permanent errors propagate out of the paginated search loop;
    /// everything else degrades to partial results
    pub fn is_permanent_auth(&self) -> bool {
        matches!(self, SearchError::Auth { .. })
    }
}

/// One scholar search backend, addressable by name from a `SearchStrategy`
#[async_trait]
pub trait ScholarSource: Send + Sync {
    fn name(&self) -> &str;

    /// Execute every query of the strategy against this source, spreading
    /// the result budget across queries and deduplicating the union
    async fn search_advanced(&self, strategy: &SearchStrategy)
        -> Result<Vec<RawPaper>, SearchError>;
}

/// Minimum-interval limiter over outbound provider requests
///
/// A single mutex guards the last-request timestamp; waiters sleep while
/// holding it, so concurrent callers cannot compress the configured spacing.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        RateLimiter {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the configured interval has elapsed since the previous
    /// acquisition, then claim the current slot
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_spaces_consecutive_acquisitions() {
        let limiter = RateLimiter::new(20.0); // 50ms interval
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        // two full intervals minus 10ms scheduler jitter allowance
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_rate_limiter_serializes_concurrent_callers() {
        let limiter = Arc::new(RateLimiter::new(20.0));
        let start = Instant::now();
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_zero_rate_disables_spacing() {
        let limiter = RateLimiter::new(0.0);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
