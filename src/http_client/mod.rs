//! HTTP client for talking to the archive.
//!
//! Every request carries browser headers, follows a bounded number of
//! redirects, and is retried with exponential backoff before giving up.

mod headers;
mod retry;

pub use retry::RetryPolicy;

use headers::{browser_headers, USER_AGENT};

use std::time::Duration;

use reqwest::header::InvalidHeaderValue;
use reqwest::{redirect, Client, Response};
use thiserror::Error;
use tracing::debug;

/// A request that still failed after every retry.
#[derive(Debug, Error)]
#[error("failed to fetch {url} after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub source: reqwest::Error,
}

/// Errors constructing the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Options for [`ArchiveClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: Option<String>,
    pub max_redirects: usize,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            max_redirects: 5,
            retry: RetryPolicy::default(),
        }
    }
}

/// HTTP client with browser headers and retry.
#[derive(Clone)]
pub struct ArchiveClient {
    client: Client,
    retry: RetryPolicy,
}

impl ArchiveClient {
    /// Create a client whose requests appear to come from `archive_origin`.
    pub fn new(archive_origin: &str, options: &ClientOptions) -> Result<Self, ClientError> {
        let client = Client::builder()
            .user_agent(options.user_agent.as_deref().unwrap_or(USER_AGENT))
            .default_headers(browser_headers(archive_origin)?)
            .redirect(redirect::Policy::limited(options.max_redirects))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            retry: options.retry,
        })
    }

    /// Single GET attempt; HTTP error statuses count as failures.
    async fn get(&self, url: &str, timeout: Duration) -> Result<Response, reqwest::Error> {
        debug!("GET {} (timeout {:?})", url, timeout);
        let response = self.client.get(url).timeout(timeout).send().await?;
        response.error_for_status()
    }

    /// Fetch a URL as text, retrying on failure.
    pub async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        self.retry
            .run(url, move || async move { self.get(url, timeout).await?.text().await })
            .await
            .map_err(|(source, attempts)| FetchError {
                url: url.to_string(),
                attempts,
                source,
            })
    }

    /// Fetch a URL as raw bytes, retrying on failure.
    pub async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        self.retry
            .run(url, move || async move {
                let body = self.get(url, timeout).await?.bytes().await?;
                Ok::<_, reqwest::Error>(body.to_vec())
            })
            .await
            .map_err(|(source, attempts)| FetchError {
                url: url.to_string(),
                attempts,
                source,
            })
    }
}
