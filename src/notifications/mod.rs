//! # Crawl Notifications
//!
//! Fans the end-of-run summary out to every registered subscriber. A
//! subscriber only has to accept a formatted status string; two are provided:
//!
//! - [`ConsoleSubscriber`]: prints the message to stdout
//! - [`WebhookSubscriber`]: posts the message as a Discord-compatible embed
//!
//! Delivery is best effort. A subscriber that fails logs the failure and the
//! remaining subscribers are still notified.
//!
//! ## Environment Configuration
//!
//! Set `NOTIFY_WEBHOOK_URL` to enable the webhook subscriber from the binary.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use tracing::{error, info};

use crate::models::{CrawlSummary, WebhookEmbed, WebhookMessage};
use crate::traits::Subscriber;

/// Handle returned by [`NotificationHub::add_subscriber`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Ordered list of subscribers notified once per completed run
#[derive(Default)]
pub struct NotificationHub {
    subscribers: Vec<(SubscriberId, Arc<dyn Subscriber>)>,
    next_id: u64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscriber(&mut self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    /// Returns `true` if a subscriber with `id` was registered
    pub fn remove_subscriber(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Sends the summary message to every subscriber in registration order
    pub async fn notify(&self, summary: &CrawlSummary) {
        let message = summary.message();
        info!(
            "Notifying {} subscribers: {}",
            self.subscribers.len(),
            message
        );

        for (_, subscriber) in &self.subscribers {
            subscriber.update(&message).await;
        }
    }
}

/// Prints notifications to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSubscriber;

#[async_trait]
impl Subscriber for ConsoleSubscriber {
    async fn update(&self, message: &str) {
        println!("Notification:-> {message}");
    }
}

/// Posts notifications to a Discord-compatible webhook
#[derive(Clone)]
pub struct WebhookSubscriber {
    /// Reusable HTTP client; shares its connection pool across clones.
    client: Client,
    webhook_url: String,
}

impl WebhookSubscriber {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url: webhook_url.into(),
        }
    }

    fn payload(message: &str) -> WebhookMessage {
        WebhookMessage {
            content: message.to_string(),
            embeds: vec![WebhookEmbed {
                title: "Price tracker run completed".to_string(),
                description: message.to_string(),
                color: 0x0058_65F2, // Discord blue
                timestamp: Utc::now().to_rfc3339(),
            }],
        }
    }
}

#[async_trait]
impl Subscriber for WebhookSubscriber {
    async fn update(&self, message: &str) {
        let payload = Self::payload(message);

        match self.client.post(&self.webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Webhook notification sent");
            }
            Ok(response) => {
                error!("Failed to send webhook notification: {}", response.status());
            }
            Err(e) => {
                error!("Failed to send webhook notification: {}", e);
            }
        }
    }
}
