//! `JsonFeedProvider` - guide listings from an HTTP JSON feed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use epgmgr_core::{GuideProvider, Show};
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::instrument;
use url::Url;

use crate::rate_limiter::RequestLimiter;
use crate::wire::{parse_shows, parse_stations};

/// Maximum number of retries for feed requests.
const MAX_RETRIES: u32 = 3;

/// Delay between retries.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider reading `{base_url}/stations/{station}/shows`.
///
/// Descriptions are fetched lazily from `{base_url}/shows/{id}/description`
/// and only when the current show changes.
#[derive(Debug)]
pub struct JsonFeedProvider {
    /// Display name, also part of the sensor entry id.
    name: String,
    /// HTTP client (reqwest, gzip enabled).
    http_client: Client,
    /// Feed root.
    base_url: Url,
    /// Delay between retries.
    retry_delay: Duration,
    /// Rate limiter shared by all stations.
    rate_limiter: Arc<Mutex<RequestLimiter>>,
}

/// Builder for `JsonFeedProvider`.
#[derive(Debug)]
pub struct JsonFeedProviderBuilder {
    name: Option<String>,
    base_url: Option<Url>,
    user_agent: Option<String>,
    min_interval: Option<Duration>,
    hourly_limit: Option<u32>,
    retry_delay: Option<Duration>,
}

impl JsonFeedProviderBuilder {
    const fn new() -> Self {
        Self {
            name: None,
            base_url: None,
            user_agent: None,
            min_interval: None,
            hourly_limit: None,
            retry_delay: None,
        }
    }

    /// Sets the provider name (default: `JSON Feed`).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the feed root (required).
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the User-Agent (required).
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the minimum request interval (default: 1s).
    #[must_use]
    pub const fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = Some(interval);
        self
    }

    /// Sets the hourly request limit (default: 500).
    #[must_use]
    pub const fn hourly_limit(mut self, limit: u32) -> Self {
        self.hourly_limit = Some(limit);
        self
    }

    /// Sets the delay between retries (default: 2s).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Builds the provider.
    ///
    /// # Errors
    ///
    /// - `base_url` or `user_agent` is not set.
    /// - `base_url` cannot carry path segments.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> Result<JsonFeedProvider> {
        let base_url = self.base_url.context("base_url is required")?;
        if base_url.cannot_be_a_base() {
            bail!("base_url '{base_url}' cannot carry a path");
        }
        let user_agent = self.user_agent.context("user_agent is required")?;

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .gzip(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let rate_limiter = Arc::new(Mutex::new(RequestLimiter::new(
            self.min_interval.unwrap_or(Duration::from_secs(1)),
            usize::try_from(self.hourly_limit.unwrap_or(500))
                .context("failed to convert hourly_limit")?,
        )));

        Ok(JsonFeedProvider {
            name: self.name.unwrap_or_else(|| String::from("JSON Feed")),
            http_client,
            base_url,
            retry_delay: self.retry_delay.unwrap_or(RETRY_DELAY),
            rate_limiter,
        })
    }
}

impl JsonFeedProvider {
    /// Creates a new builder.
    #[must_use]
    pub const fn builder() -> JsonFeedProviderBuilder {
        JsonFeedProviderBuilder::new()
    }

    /// Appends path segments to the feed root, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("base_url '{}' cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a GET request with retry logic.
    ///
    /// Retries up to `MAX_RETRIES` times on transport errors, server errors
    /// and parse failures. Client errors other than 429 fail immediately.
    async fn request_with_retry<T, F>(&self, command: &str, url: &Url, parse: F) -> Result<T>
    where
        F: Fn(&str) -> Result<T>,
    {
        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            self.rate_limiter.lock().await.wait().await;

            let response = match self.http_client.get(url.clone()).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(%command, attempt, error = %e, "Request failed, will retry");
                    last_err =
                        Some(anyhow::Error::new(e).context(format!("{command} request failed")));
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map_or(self.retry_delay, |secs| {
                        Duration::from_secs(secs.saturating_add(1))
                    });
                tracing::warn!(
                    %command,
                    attempt,
                    retry_after_secs = retry_after.as_secs(),
                    "Rate limited, waiting before retry"
                );
                last_err = Some(anyhow!("{command} rate limited (HTTP {status})"));
                tokio::time::sleep(retry_after).await;
                continue;
            }
            if status.is_client_error() {
                bail!("{command} rejected (HTTP {status})");
            }
            if !status.is_success() {
                tracing::warn!(%command, attempt, code = status.as_u16(), "Server error, will retry");
                last_err = Some(anyhow!("{command} failed (HTTP {status})"));
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(%command, attempt, error = %e, "Failed to read response body, will retry");
                    last_err = Some(
                        anyhow::Error::new(e).context(format!("failed to read {command} response")),
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };
            tracing::debug!(%command, body_len = body.len(), "Response body received");

            match parse(&body) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(%command, attempt, error = %e, "Parse error, will retry");
                    last_err = Some(e);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{command} failed after retries")))
    }
}

impl GuideProvider for JsonFeedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(station = %station))]
    async fn list_shows(&self, station: &str) -> Result<Vec<Show>> {
        let url = self.endpoint(&["stations", station, "shows"])?;
        self.request_with_retry("ListShows", &url, |body| parse_shows(body, station))
            .await
    }

    #[instrument(skip_all)]
    async fn list_stations(&self) -> Result<Vec<String>> {
        let url = self.endpoint(&["stations"])?;
        self.request_with_retry("ListStations", &url, parse_stations)
            .await
    }

    #[instrument(skip_all, fields(title = %show.title))]
    async fn describe_show(&self, show: &Show) -> Result<String> {
        if let Some(description) = &show.description {
            return Ok(description.clone());
        }
        let Some(id) = show.id.as_deref() else {
            return Ok(String::new());
        };
        let url = self.endpoint(&["shows", id, "description"])?;
        self.request_with_retry("DescribeShow", &url, |body| Ok(String::from(body.trim())))
            .await
    }

    fn link_for(&self, show: &Show) -> String {
        if let Some(link) = &show.link {
            return link.clone();
        }
        show.id
            .as_deref()
            .and_then(|id| self.endpoint(&["shows", id]).ok())
            .map_or_else(String::new, String::from)
    }
}
