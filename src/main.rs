use anyhow::Result;
use clap::Parser;
use price_tracker::config::Config;
use price_tracker::database::ConnectionProvider;
use price_tracker::fetcher::HttpFetcher;
use price_tracker::notifications::{ConsoleSubscriber, NotificationHub, WebhookSubscriber};
use price_tracker::output::JsonFileSink;
use price_tracker::{PriceCache, PriceTracker, ScrapeError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Scrapes paginated product listings and reports price changes
#[derive(Parser, Debug)]
#[command(name = "price-tracker", version, about)]
struct Cli {
    /// Number of listing pages to scrape
    #[arg(value_name = "PAGES", default_value_t = 5)]
    pages: u32,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        println!("An error occurred during scraping: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env(cli.pages)?;
    info!("Starting price tracker for {} pages", config.crawl.pages_to_scrape);

    let provider = match &config.redis_url {
        Some(url) => ConnectionProvider::connect(url).await,
        None => ConnectionProvider::disabled(),
    };

    let mut notifications = NotificationHub::new();
    notifications.add_subscriber(Arc::new(ConsoleSubscriber));
    if let Some(url) = &config.webhook_url {
        notifications.add_subscriber(Arc::new(WebhookSubscriber::new(url.clone())));
    }

    let tracker = PriceTracker::new(
        config.crawl.clone(),
        Arc::new(
            HttpFetcher::new(config.static_token.clone())?
                .with_proxy(config.crawl.proxy.clone())?,
        ),
        Arc::new(PriceCache::with_provider(&provider)),
        Arc::new(JsonFileSink::new(config.output_file.clone())),
        notifications,
    )?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, cancelling");
            ctrl_c_cancel.cancel();
        }
    });

    let tracker = Arc::new(Mutex::new(tracker));

    let first_run = tracker.lock().await.run(&cancel).await;
    match first_run {
        Ok(records) => {
            println!("Scraping completed. Total products scraped: {}", records.len());
        }
        Err(e) if keeps_scheduling(config.schedule.is_some(), &e) => {
            error!("Error during initial crawl: {}", e);
        }
        Err(e) => return Err(e.into()),
    }

    let Some(schedule) = config.schedule else {
        return Ok(());
    };

    let sched = JobScheduler::new().await?;
    let job_tracker = tracker.clone();
    let job_cancel = cancel.clone();
    sched
        .add(Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let tracker = job_tracker.clone();
            let cancel = job_cancel.clone();
            Box::pin(async move {
                match tracker.lock().await.run(&cancel).await {
                    Ok(records) => {
                        println!("Scraping completed. Total products scraped: {}", records.len());
                    }
                    Err(e) => error!("Scheduled crawl failed: {}", e),
                }
            })
        })?)
        .await?;

    info!("Scheduler started with schedule {}", schedule);
    sched.start().await?;

    cancel.cancelled().await;
    Ok(())
}

/// A failed first run is only fatal without a schedule; cancellation always is
fn keeps_scheduling(scheduled: bool, error: &ScrapeError) -> bool {
    scheduled && !matches!(error, ScrapeError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_first_run_keeps_scheduling() {
        let error = ScrapeError::Unauthorized;

        assert!(keeps_scheduling(true, &error));
        assert!(!keeps_scheduling(false, &error));
    }

    #[test]
    fn test_cancelled_first_run_stops_scheduling() {
        assert!(!keeps_scheduling(true, &ScrapeError::Cancelled));
    }

    #[test]
    fn test_cli_page_count() {
        assert_eq!(Cli::parse_from(["price-tracker"]).pages, 5);
        assert_eq!(Cli::parse_from(["price-tracker", "2"]).pages, 2);
    }
}
