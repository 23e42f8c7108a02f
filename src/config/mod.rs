//! Environment-driven configuration
//!
//! Every setting is optional and falls back to a default. Values are read
//! after `.env` has been loaded by the binary.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::extractor::SiteSelectors;
use crate::output::DEFAULT_OUTPUT_FILE;
use crate::traits::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://dentalstall.com/";
pub const DEFAULT_PAGE_PATH: &str = "shop/page/{page}/";

/// Settings for one crawl
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub base_url: String,
    /// Path appended to `base_url`; `{page}` is replaced by the page number
    pub page_path: String,
    pub pages_to_scrape: u32,
    pub proxy: Option<String>,
    /// Token sent with every request
    pub token: Option<String>,
    pub retry: RetryPolicy,
    /// Pause between consecutive pages
    pub page_delay: Duration,
    pub selectors: SiteSelectors,
}

impl CrawlConfig {
    pub fn new(base_url: impl Into<String>, pages_to_scrape: u32) -> Self {
        Self {
            base_url: base_url.into(),
            page_path: DEFAULT_PAGE_PATH.to_string(),
            pages_to_scrape,
            proxy: None,
            token: None,
            retry: RetryPolicy::default(),
            page_delay: Duration::from_secs(2),
            selectors: SiteSelectors::default(),
        }
    }

    /// Builds the URL of a 1-indexed page
    pub fn page_url(&self, page: u32) -> String {
        let path = self.page_path.replace("{page}", &page.to_string());
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub crawl: CrawlConfig,
    /// The token requests must carry; `None` means no token is required
    pub static_token: Option<String>,
    pub output_file: PathBuf,
    pub redis_url: Option<String>,
    pub webhook_url: Option<String>,
    /// Cron expression for periodic runs
    pub schedule: Option<String>,
}

impl Config {
    /// Reads configuration from `SCRAPER_*`, `REDIS_URL`, `NOTIFY_WEBHOOK_URL`
    /// and `SCRAPE_SCHEDULE`
    pub fn from_env(pages_to_scrape: u32) -> Result<Self> {
        Self::from_lookup(pages_to_scrape, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(pages_to_scrape: u32, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if pages_to_scrape == 0 {
            bail!("Number of pages to scrape must be positive");
        }

        let max_retries: u32 = parse_or(&var, "SCRAPER_MAX_RETRIES", 3)?;
        if max_retries == 0 {
            bail!("SCRAPER_MAX_RETRIES must be at least 1");
        }
        let retry_delay: u64 = parse_or(&var, "SCRAPER_RETRY_DELAY_SECS", 2)?;
        let page_delay: u64 = parse_or(&var, "SCRAPER_PAGE_DELAY_SECS", 2)?;

        let proxy = var("SCRAPER_PROXY");
        if let Some(proxy) = &proxy {
            reqwest::Proxy::all(proxy.as_str())
                .with_context(|| format!("Invalid SCRAPER_PROXY: {proxy}"))?;
        }

        let mut crawl = CrawlConfig::new(
            var("SCRAPER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            pages_to_scrape,
        );
        if let Some(page_path) = var("SCRAPER_PAGE_PATH") {
            crawl.page_path = page_path;
        }
        crawl.proxy = proxy;
        crawl.token = var("SCRAPER_TOKEN");
        crawl.retry = RetryPolicy::new(max_retries, Duration::from_secs(retry_delay));
        crawl.page_delay = Duration::from_secs(page_delay);

        Ok(Self {
            crawl,
            static_token: var("SCRAPER_STATIC_TOKEN"),
            output_file: var("SCRAPER_OUTPUT_FILE")
                .map_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FILE), PathBuf::from),
            redis_url: var("REDIS_URL"),
            webhook_url: var("NOTIFY_WEBHOOK_URL"),
            schedule: var("SCRAPE_SCHEDULE"),
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {value}")),
        None => Ok(default),
    }
}
