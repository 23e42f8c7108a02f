//! Price change detection
//!
//! Decides per title whether a price is new or unchanged since it was last
//! seen. State lives in a process-local map; when the connection provider has
//! a live key-value store, the store is consulted first so that changes are
//! detected across runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::database::ConnectionProvider;
use crate::models::ChangeStatus;
use crate::traits::PriceStore;

/// Default key prefix for prices kept in the key-value store
pub const DEFAULT_KEY_PREFIX: &str = "price:";

pub struct PriceCache {
    local: Mutex<HashMap<String, f64>>,
    store: Option<Arc<dyn PriceStore>>,
    key_prefix: String,
}

impl PriceCache {
    /// A purely in-process cache
    pub fn in_memory() -> Self {
        Self {
            local: Mutex::new(HashMap::new()),
            store: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// A cache backed by the provider's connection when it has one
    pub fn with_provider(provider: &ConnectionProvider) -> Self {
        Self {
            store: provider
                .get_connection()
                .map(|connection| Arc::new(connection) as Arc<dyn PriceStore>),
            ..Self::in_memory()
        }
    }

    /// A cache backed by an arbitrary durable store
    pub fn with_store(store: Arc<dyn PriceStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::in_memory()
        }
    }

    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Compares `new_price` with the last price seen for `title` and records it
    ///
    /// A first sighting counts as `Updated`. Prices are compared numerically.
    pub async fn check_and_update(&self, title: &str, new_price: f64) -> ChangeStatus {
        let status = match self.check_store(title, new_price).await {
            Some(status) => {
                self.lock().insert(title.to_string(), new_price);
                status
            }
            None => self.check_local(title, new_price),
        };

        match status {
            ChangeStatus::Unchanged => info!(
                "Skipping update in cache as title: {} and price: {} remains same",
                title, new_price
            ),
            ChangeStatus::Updated => info!(
                "Product updated with title: {} and new price: {}",
                title, new_price
            ),
        }

        status
    }

    /// Number of titles seen by this process
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, f64>> {
        // A poisoned map still holds valid prices
        self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_local(&self, title: &str, new_price: f64) -> ChangeStatus {
        let mut local = self.lock();
        match local.get(title) {
            Some(cached) if *cached == new_price => ChangeStatus::Unchanged,
            _ => {
                local.insert(title.to_string(), new_price);
                ChangeStatus::Updated
            }
        }
    }

    /// Returns `None` when there is no store or it could not be used
    async fn check_store(&self, title: &str, new_price: f64) -> Option<ChangeStatus> {
        let store = self.store.as_ref()?;
        let key = format!("{}{}", self.key_prefix, title);

        let cached = match store.get_price(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Key-value store unavailable, using in-process cache: {}", e);
                return None;
            }
        };

        if cached == Some(new_price) {
            return Some(ChangeStatus::Unchanged);
        }

        if let Err(e) = store.set_price(&key, new_price).await {
            warn!("Key-value store unavailable, using in-process cache: {}", e);
            return None;
        }

        Some(ChangeStatus::Updated)
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::in_memory()
    }
}
