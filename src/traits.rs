//! Seams between the crawl pipeline and its collaborators

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::models::{FetchRequest, Record};

/// Retry settings for a single page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of network attempts, always at least one
    pub max_retries: u32,
    /// Fixed delay between consecutive failed attempts
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Trait for page fetchers
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the raw body of one page, retrying per `policy`
    ///
    /// # Returns
    /// * `Ok(String)` - The full response body
    /// * `Err(ScrapeError)` - `Unauthorized`, `FetchExhausted` or `Cancelled`
    async fn fetch(
        &self,
        request: &FetchRequest,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> crate::Result<String>;
}

/// A notification subscriber; accepts one formatted status string
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn update(&self, message: &str);
}

/// Durable key-value storage for last-seen prices
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn get_price(&self, key: &str) -> Result<Option<f64>>;
    async fn set_price(&self, key: &str, price: f64) -> Result<()>;
}

/// Durable destination for the accumulated record set
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn save(&self, records: &[Record]) -> Result<()>;
}
