//! Data models for scraped records, crawl summaries and webhook payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A product record extracted from one listing card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "product_title")]
    pub title: String,
    #[serde(rename = "product_price")]
    pub price: f64,
    #[serde(rename = "path_to_image")]
    pub image_path: String,
}

/// Outcome of a change-detection decision for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Unchanged,
    Updated,
}

/// A single page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub proxy: Option<String>,
    pub token: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            proxy: None,
            token: None,
        }
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

/// Aggregate counts reported once a run completes
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSummary {
    pub scraped_count: usize,
    pub updated_count: usize,
    pub completed_at: DateTime<Utc>,
}

impl CrawlSummary {
    pub fn new(scraped_count: usize, updated_count: usize) -> Self {
        Self {
            scraped_count,
            updated_count,
            completed_at: Utc::now(),
        }
    }

    /// The status line handed to every subscriber
    pub fn message(&self) -> String {
        format!(
            "Scraped {} products and updated {} in the database.",
            self.scraped_count, self.updated_count
        )
    }
}

/// Discord-compatible embed for webhook notifications
#[derive(Debug, Serialize)]
pub struct WebhookEmbed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub timestamp: String,
}

/// Webhook message payload
#[derive(Debug, Serialize)]
pub struct WebhookMessage {
    pub content: String,
    pub embeds: Vec<WebhookEmbed>,
}
