//! Shared key-value store connection

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

use crate::traits::PriceStore;

/// Holds the single process-wide connection to the key-value store
///
/// Created once at startup and handed to whatever needs the store. A failed
/// initial connection leaves the provider empty; callers then work without it.
#[derive(Clone, Default)]
pub struct ConnectionProvider {
    connection: Option<ConnectionManager>,
}

impl ConnectionProvider {
    /// Connects to `redis_url` and verifies the connection with a PING
    pub async fn connect(redis_url: &str) -> Self {
        match Self::open(redis_url).await {
            Ok(connection) => {
                info!("Connected to key-value store at {}", redis_url);
                Self {
                    connection: Some(connection),
                }
            }
            Err(e) => {
                warn!(
                    "Failed to connect to key-value store at {}: {} - using in-process cache",
                    redis_url, e
                );
                Self::disabled()
            }
        }
    }

    /// A provider that never hands out a connection
    pub fn disabled() -> Self {
        Self { connection: None }
    }

    async fn open(redis_url: &str) -> Result<ConnectionManager> {
        let client = redis::Client::open(redis_url)?;
        let mut connection = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        Ok(connection)
    }

    /// Returns a handle to the shared connection, if one was established
    pub fn get_connection(&self) -> Option<ConnectionManager> {
        self.connection.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

#[async_trait]
impl PriceStore for ConnectionManager {
    async fn get_price(&self, key: &str) -> Result<Option<f64>> {
        let mut connection = self.clone();
        let price: Option<f64> = connection.get(key).await?;
        Ok(price)
    }

    async fn set_price(&self, key: &str, price: f64) -> Result<()> {
        let mut connection = self.clone();
        connection.set::<_, _, ()>(key, price).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_provider_has_no_connection() {
        let provider = ConnectionProvider::disabled();
        assert!(!provider.is_connected());
        assert!(provider.get_connection().is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_degrades_to_no_connection() {
        let provider = ConnectionProvider::connect("not-a-redis-url").await;
        assert!(provider.get_connection().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_to_no_connection() {
        let provider = ConnectionProvider::connect("redis://127.0.0.1:1/").await;
        assert!(!provider.is_connected());
    }
}
