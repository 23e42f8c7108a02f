use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::PriceCache;
use crate::config::CrawlConfig;
use crate::extractor::Extractor;
use crate::models::{ChangeStatus, CrawlSummary, FetchRequest, Record};
use crate::notifications::NotificationHub;
use crate::traits::{PageFetcher, RecordSink};
use crate::{Result, ScrapeError};

/// Lifecycle of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running { page: u32 },
    Completed,
    Failed,
    Cancelled,
}

/// Drives fetch, extraction and change detection across the configured pages
pub struct PriceTracker {
    config: CrawlConfig,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Extractor,
    cache: Arc<PriceCache>,
    sink: Arc<dyn RecordSink>,
    notifications: NotificationHub,
    state: CrawlState,
}

impl PriceTracker {
    pub fn new(
        config: CrawlConfig,
        fetcher: Arc<dyn PageFetcher>,
        cache: Arc<PriceCache>,
        sink: Arc<dyn RecordSink>,
        notifications: NotificationHub,
    ) -> anyhow::Result<Self> {
        let extractor = Extractor::new(&config.selectors)?;

        Ok(Self {
            config,
            fetcher,
            extractor,
            cache,
            sink,
            notifications,
            state: CrawlState::Idle,
        })
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    /// Runs one crawl over pages `1..=pages_to_scrape`
    ///
    /// On success the records are persisted, the summary is sent to every
    /// subscriber and all records, changed or not, are returned in
    /// page-then-card order. A failed or cancelled run neither persists nor
    /// notifies.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<Vec<Record>> {
        match self.crawl(cancel).await {
            Ok((records, updated_count)) => {
                let result = self.finish(records, updated_count).await;
                self.state = match &result {
                    Ok(_) => CrawlState::Completed,
                    Err(e) => {
                        error!("Crawl failed: {}", e);
                        CrawlState::Failed
                    }
                };
                result
            }
            Err(ScrapeError::Cancelled) => {
                warn!("Crawl cancelled");
                self.state = CrawlState::Cancelled;
                Err(ScrapeError::Cancelled)
            }
            Err(e) => {
                error!("Crawl failed: {}", e);
                self.state = CrawlState::Failed;
                Err(e)
            }
        }
    }

    async fn crawl(&mut self, cancel: &CancellationToken) -> Result<(Vec<Record>, usize)> {
        let pages = self.config.pages_to_scrape;
        let mut all_records = Vec::new();
        let mut updated_count = 0;

        info!("Starting crawl of {} pages from {}", pages, self.config.base_url);

        for page in 1..=pages {
            self.state = CrawlState::Running { page };

            let url = self.config.page_url(page);
            info!("Fetching page {}/{}: {}", page, pages, url);

            let request = FetchRequest::new(url)
                .with_proxy(self.config.proxy.clone())
                .with_token(self.config.token.clone());
            let html = self
                .fetcher
                .fetch(&request, self.config.retry, cancel)
                .await?;

            let records = self.extractor.extract(&html);
            info!("Found {} products on page {}", records.len(), page);

            for record in &records {
                if self.cache.check_and_update(&record.title, record.price).await
                    == ChangeStatus::Updated
                {
                    updated_count += 1;
                }
            }

            all_records.extend(records);

            if page < pages {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                    () = tokio::time::sleep(self.config.page_delay) => {}
                }
            }
        }

        Ok((all_records, updated_count))
    }

    async fn finish(&self, records: Vec<Record>, updated_count: usize) -> Result<Vec<Record>> {
        self.sink
            .save(&records)
            .await
            .map_err(ScrapeError::Persistence)?;

        let summary = CrawlSummary::new(records.len(), updated_count);
        info!(
            "Crawl completed at {}: {} scraped, {} updated",
            summary.completed_at.to_rfc3339(),
            summary.scraped_count,
            summary.updated_count
        );
        self.notifications.notify(&summary).await;

        Ok(records)
    }
}
