//! Paginated product price tracker
//!
//! Fetches listing pages, extracts product records, detects price changes
//! against a cache, persists the full result set and notifies subscribers.

pub mod cache;
pub mod config;
pub mod database;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod notifications;
pub mod output;
pub mod price_tracker;
pub mod traits;

use thiserror::Error;

/// Errors that abort a crawl run
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Unauthorized: invalid or missing token")]
    Unauthorized,

    #[error(
        "Failed to fetch data from url: {url} after {attempts} attempts, last error: {last_error}"
    )]
    FetchExhausted {
        url: String,
        attempts: u32,
        #[source]
        last_error: AttemptError,
    },

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to persist records: {0:#}")]
    Persistence(anyhow::Error),
}

/// Why a single fetch attempt failed
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

pub use cache::PriceCache;
pub use config::Config;
pub use models::{ChangeStatus, CrawlSummary, FetchRequest, Record};
pub use price_tracker::{CrawlState, PriceTracker};
