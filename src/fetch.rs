//! Raw document retrieval.
//!
//! - **[`HttpFetcher`]** downloads the markdown over HTTP with a timeout and
//!   bounded retries.
//! - **[`FileFetcher`]** reads it from a local path (offline use, tests).
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, ... capped at 32s)
//! - Other non-success status → fail immediately
//! - Network errors → retry

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::error::{CatalogError, Result};

/// Source of the raw catalog document.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_raw(&self) -> Result<String>;

    /// Where the document comes from, for logs and stats.
    fn source(&self) -> String;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ftc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            max_retries,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_raw(&self) -> Result<String> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, delay_secs = delay.as_secs(), "retrying fetch");
                tokio::time::sleep(delay).await;
            }

            match self.client.get(&self.url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body = response.text().await.map_err(|e| {
                            CatalogError::Fetch(format!("failed to read body from {}: {e}", self.url))
                        })?;
                        tracing::info!(url = %self.url, bytes = body.len(), "fetched catalog source");
                        return Ok(body);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(url = %self.url, %status, attempt, "transient fetch failure");
                        last_err = Some(format!("{} returned {}", self.url, status));
                        continue;
                    }

                    return Err(CatalogError::Fetch(format!(
                        "{} returned {}",
                        self.url, status
                    )));
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, attempt, "fetch request failed");
                    last_err = Some(format!("request to {} failed: {e}", self.url));
                }
            }
        }

        Err(CatalogError::Fetch(last_err.unwrap_or_else(|| {
            format!("{} failed after retries", self.url)
        })))
    }

    fn source(&self) -> String {
        self.url.clone()
    }
}

pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch_raw(&self) -> Result<String> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CatalogError::Fetch(format!("failed to read {}: {e}", self.path.display()))
        })?;
        tracing::info!(path = %self.path.display(), bytes = raw.len(), "read catalog source");
        Ok(raw)
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }
}

/// Build the fetcher selected by `[source]`: a local `path` wins over `url`.
pub fn fetcher_from_config(source: &SourceConfig) -> Result<Box<dyn Fetcher>> {
    match &source.path {
        Some(path) => Ok(Box::new(FileFetcher::new(path))),
        None => Ok(Box::new(HttpFetcher::new(
            source.url.clone(),
            Duration::from_secs(source.timeout_secs),
            source.max_retries,
        )?)),
    }
}
