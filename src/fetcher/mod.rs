use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::FetchRequest;
use crate::traits::{PageFetcher, RetryPolicy};
use crate::{AttemptError, Result, ScrapeError};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Builds an HTTP client, routing both HTTP and HTTPS through `proxy` when given
pub fn build_client(proxy: Option<&str>) -> std::result::Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10));

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

/// reqwest-backed fetcher guarded by a static bearer token
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    /// Proxy the shared client was built with
    proxy: Option<String>,
    static_token: Option<String>,
}

impl HttpFetcher {
    /// `static_token` is the token every request must carry; `None` means no token is required
    pub fn new(static_token: Option<String>) -> Result<Self> {
        let client = build_client(None)?;

        Ok(Self {
            client,
            proxy: None,
            static_token,
        })
    }

    /// Rebuilds the shared client to route through `proxy`
    pub fn with_proxy(mut self, proxy: Option<String>) -> Result<Self> {
        self.client = build_client(proxy.as_deref())?;
        self.proxy = proxy;
        Ok(self)
    }

    /// Requests through the configured proxy reuse the shared client and its pool
    fn client_for(&self, proxy: Option<&str>) -> Result<Client> {
        if proxy == self.proxy.as_deref() {
            return Ok(self.client.clone());
        }

        debug!("Building one-off client for proxy {:?}", proxy);
        Ok(build_client(proxy)?)
    }

    async fn attempt(
        client: &Client,
        request: &FetchRequest,
    ) -> std::result::Result<String, AttemptError> {
        let mut builder = client.get(&request.url);
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            return Err(AttemptError::Status(response.status()));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if request.token != self.static_token {
            return Err(ScrapeError::Unauthorized);
        }

        let client = self.client_for(request.proxy.as_deref())?;
        let attempts = policy.max_retries.max(1);
        let mut attempt = 1;

        loop {
            debug!("Fetching {} (attempt {}/{})", request.url, attempt, attempts);

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                outcome = Self::attempt(&client, request) => outcome,
            };

            match outcome {
                Ok(body) => {
                    info!("Fetched {} ({} bytes)", request.url, body.len());
                    return Ok(body);
                }
                Err(e) => {
                    warn!(
                        "Error while fetching data from URL {} (attempt {}/{}): {}",
                        request.url, attempt, attempts, e
                    );

                    if attempt >= attempts {
                        return Err(ScrapeError::FetchExhausted {
                            url: request.url.clone(),
                            attempts,
                            last_error: e,
                        });
                    }
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                () = tokio::time::sleep(policy.base_delay) => {}
            }

            attempt += 1;
        }
    }
}
