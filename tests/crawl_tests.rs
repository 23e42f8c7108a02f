//! Integration tests for fetching and crawling
//!
//! These tests use wiremock to serve listing pages and failures, and run the
//! real HTTP fetcher and JSON sink end-to-end.

use async_trait::async_trait;
use price_tracker::config::CrawlConfig;
use price_tracker::fetcher::HttpFetcher;
use price_tracker::notifications::NotificationHub;
use price_tracker::output::JsonFileSink;
use price_tracker::traits::{PageFetcher, RetryPolicy, Subscriber};
use price_tracker::{CrawlState, FetchRequest, PriceCache, PriceTracker, ScrapeError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Subscriber for Recorder {
    async fn update(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

fn listing(page: u32) -> String {
    let cards: String = (1..=3)
        .map(|card| {
            format!(
                r#"<div class="product-card">
                    <img src="https://cdn.test/uploads/p{page}-{card}.jpg">
                    <h3 class="product-title">Product {page}-{card}</h3>
                    <span class="product-price">$1,{page}0{card}.50</span>
                </div>"#
            )
        })
        .collect();
    format!("<html><body><main>{cards}</main></body></html>")
}

async fn mount_page(server: &MockServer, page: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/shop/page/{page}/")))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(page)))
        .expect(1)
        .mount(server)
        .await;
}

fn fast_config(base_url: &str, pages: u32) -> CrawlConfig {
    let mut config = CrawlConfig::new(base_url, pages);
    config.retry = RetryPolicy::new(3, Duration::ZERO);
    config.page_delay = Duration::ZERO;
    config
}

#[tokio::test]
async fn test_fetch_retries_up_to_limit_then_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(None).unwrap();
    let request = FetchRequest::new(format!("{}/shop/page/1/", server.uri()));
    let policy = RetryPolicy::new(3, Duration::from_millis(100));

    let started = Instant::now();
    let result = fetcher.fetch(&request, policy, &CancellationToken::new()).await;
    let elapsed = started.elapsed();

    match result {
        Err(ScrapeError::FetchExhausted {
            url,
            attempts,
            last_error,
        }) => {
            assert_eq!(url, request.url);
            assert_eq!(attempts, 3);
            assert!(
                last_error.to_string().contains("500"),
                "unexpected error: {last_error}"
            );
        }
        other => panic!("expected FetchExhausted, got {other:?}"),
    }

    // Two pauses between three attempts, none after the last
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(300) + Duration::from_secs(2));
}

#[tokio::test]
async fn test_fetch_recovers_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(None).unwrap();
    let request = FetchRequest::new(format!("{}/shop/page/1/", server.uri()));

    let body = fetcher
        .fetch(
            &request,
            RetryPolicy::new(3, Duration::ZERO),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(body, "<html>ok</html>");
}

fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test]
async fn test_cancel_interrupts_retry_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(None).unwrap();
    let request = FetchRequest::new(format!("{}/shop/page/1/", server.uri()));
    let policy = RetryPolicy::new(3, Duration::from_secs(10));
    let cancel = cancel_after(Duration::from_millis(200));

    let started = Instant::now();
    let result = fetcher.fetch(&request, policy, &cancel).await;

    assert!(matches!(result, Err(ScrapeError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancel_interrupts_in_flight_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("too late")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(None).unwrap();
    let request = FetchRequest::new(format!("{}/shop/page/1/", server.uri()));
    let cancel = cancel_after(Duration::from_millis(200));

    let started = Instant::now();
    let result = fetcher.fetch(&request, RetryPolicy::default(), &cancel).await;

    assert!(matches!(result, Err(ScrapeError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_unauthorized_fetch_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(Some("expected".to_string())).unwrap();
    let request = FetchRequest::new(format!("{}/shop/page/1/", server.uri()))
        .with_token(Some("wrong".to_string()));

    let result = fetcher
        .fetch(&request, RetryPolicy::default(), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ScrapeError::Unauthorized)));
}

#[tokio::test]
async fn test_bearer_token_is_sent_when_present() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("authorized"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(Some("s3cret".to_string())).unwrap();
    let request = FetchRequest::new(format!("{}/shop/page/1/", server.uri()))
        .with_token(Some("s3cret".to_string()));

    let body = fetcher
        .fetch(&request, RetryPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(body, "authorized");
}

#[tokio::test]
async fn test_requests_are_routed_through_proxy() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("via proxy"))
        .expect(1)
        .mount(&proxy)
        .await;

    let fetcher = HttpFetcher::new(None).unwrap();
    let request = FetchRequest::new("http://shop.invalid/shop/page/1/")
        .with_proxy(Some(proxy.uri()));

    let body = fetcher
        .fetch(
            &request,
            RetryPolicy::new(1, Duration::ZERO),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(body, "via proxy");
}

#[tokio::test]
async fn test_full_crawl_persists_and_notifies() {
    let server = MockServer::start().await;
    mount_page(&server, 1).await;
    mount_page(&server, 2).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("products.json");
    let recorder = Arc::new(Recorder::default());
    let mut hub = NotificationHub::new();
    hub.add_subscriber(recorder.clone());

    let mut tracker = PriceTracker::new(
        fast_config(&server.uri(), 2),
        Arc::new(HttpFetcher::new(None).unwrap()),
        Arc::new(PriceCache::in_memory()),
        Arc::new(JsonFileSink::new(&output)),
        hub,
    )
    .unwrap();

    let records = tracker.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(tracker.state(), CrawlState::Completed);
    let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Product 1-1",
            "Product 1-2",
            "Product 1-3",
            "Product 2-1",
            "Product 2-2",
            "Product 2-3",
        ]
    );
    assert_eq!(records[0].price, 1101.5);
    assert_eq!(records[5].image_path, "images/p2-3.jpg");

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    let entries = saved.as_array().unwrap();
    assert_eq!(entries.len(), 6);
    assert_eq!(entries[0]["product_title"], "Product 1-1");
    assert_eq!(entries[0]["product_price"], 1101.5);
    assert_eq!(entries[0]["path_to_image"], "images/p1-1.jpg");

    assert_eq!(
        *recorder.messages.lock().unwrap(),
        vec!["Scraped 6 products and updated 6 in the database.".to_string()]
    );
}

#[tokio::test]
async fn test_exhausted_page_fails_run_without_summary_or_output() {
    let server = MockServer::start().await;
    mount_page(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/shop/page/2/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("products.json");
    let recorder = Arc::new(Recorder::default());
    let mut hub = NotificationHub::new();
    hub.add_subscriber(recorder.clone());

    let mut tracker = PriceTracker::new(
        fast_config(&server.uri(), 3),
        Arc::new(HttpFetcher::new(None).unwrap()),
        Arc::new(PriceCache::in_memory()),
        Arc::new(JsonFileSink::new(&output)),
        hub,
    )
    .unwrap();

    let result = tracker.run(&CancellationToken::new()).await;

    assert!(matches!(result, Err(ScrapeError::FetchExhausted { .. })));
    assert_eq!(tracker.state(), CrawlState::Failed);
    assert!(!output.exists());
    assert!(recorder.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_run_reports_only_changed_prices() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shop/page/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(1)))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut hub = NotificationHub::new();
    hub.add_subscriber(recorder.clone());

    let mut tracker = PriceTracker::new(
        fast_config(&server.uri(), 1),
        Arc::new(HttpFetcher::new(None).unwrap()),
        Arc::new(PriceCache::in_memory()),
        Arc::new(JsonFileSink::new(dir.path().join("products.json"))),
        hub,
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let first = tracker.run(&cancel).await.unwrap();
    let second = tracker.run(&cancel).await.unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
    assert_eq!(
        *recorder.messages.lock().unwrap(),
        vec![
            "Scraped 3 products and updated 3 in the database.".to_string(),
            "Scraped 3 products and updated 0 in the database.".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_unauthorized_crawl_fails_without_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(1)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("products.json");
    let recorder = Arc::new(Recorder::default());
    let mut hub = NotificationHub::new();
    hub.add_subscriber(recorder.clone());

    let mut tracker = PriceTracker::new(
        fast_config(&server.uri(), 2),
        Arc::new(HttpFetcher::new(Some("expected".to_string())).unwrap()),
        Arc::new(PriceCache::in_memory()),
        Arc::new(JsonFileSink::new(&output)),
        hub,
    )
    .unwrap();

    let result = tracker.run(&CancellationToken::new()).await;

    assert!(matches!(result, Err(ScrapeError::Unauthorized)));
    assert_eq!(tracker.state(), CrawlState::Failed);
    assert!(!output.exists());
    assert!(recorder.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_configured_proxy_client_is_used() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("shared proxy client"))
        .expect(1)
        .mount(&proxy)
        .await;

    let fetcher = HttpFetcher::new(None)
        .unwrap()
        .with_proxy(Some(proxy.uri()))
        .unwrap();
    let request = FetchRequest::new("http://shop.invalid/shop/page/1/")
        .with_proxy(Some(proxy.uri()));

    let body = fetcher
        .fetch(
            &request,
            RetryPolicy::new(1, Duration::ZERO),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(body, "shared proxy client");
}
