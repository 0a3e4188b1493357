//! `HassSink` - sensor entries on a Home Assistant instance.
//!
//! Uses the REST `states` endpoints. Home Assistant replaces state and
//! attributes together on every write, so the sink keeps a local copy of
//! both per entry and always sends the full set.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use epgmgr_core::{Availability, CreationOptions, EntryId, SensorSink, ShowAttributes};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use url::Url;

/// State written when an entry is created.
const UNKNOWN_STATE: &str = "unknown";

/// State written for [`Availability::Down`].
const UNAVAILABLE_STATE: &str = "unavailable";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
struct CachedState {
    state: String,
    /// Attributes from the creation options (`friendly_name`, unit).
    base: Map<String, Value>,
    /// Attributes of the current show.
    show: Map<String, Value>,
}

impl CachedState {
    fn merged_attributes(&self) -> Map<String, Value> {
        let mut attributes = self.base.clone();
        attributes.extend(self.show.clone());
        attributes
    }
}

#[derive(Debug, Deserialize)]
struct HassState {
    entity_id: String,
    state: String,
}

/// Sink writing to `{base_url}/api/states/{entry}`.
pub struct HassSink {
    http_client: Client,
    base_url: Url,
    token: String,
    cache: Mutex<HashMap<EntryId, CachedState>>,
}

impl fmt::Debug for HassSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HassSink")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Builder for `HassSink`.
#[derive(Default)]
pub struct HassSinkBuilder {
    base_url: Option<Url>,
    token: Option<String>,
    user_agent: Option<String>,
}

impl fmt::Debug for HassSinkBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HassSinkBuilder")
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl HassSinkBuilder {
    /// Sets the Home Assistant root URL (required).
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the long-lived access token (required).
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the User-Agent.
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Builds the sink.
    ///
    /// # Errors
    ///
    /// - `base_url` or `token` is not set.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> Result<HassSink> {
        let base_url = self.base_url.context("base_url is required")?;
        if base_url.cannot_be_a_base() {
            bail!("base_url '{base_url}' cannot carry a path");
        }
        let token = self.token.context("token is required")?;
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("epgmgr/{}", env!("CARGO_PKG_VERSION")));

        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(HassSink {
            http_client,
            base_url,
            token,
            cache: Mutex::new(HashMap::new()),
        })
    }
}

impl HassSink {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> HassSinkBuilder {
        HassSinkBuilder::default()
    }

    fn states_url(&self, entry: Option<&EntryId>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| anyhow!("base_url '{}' cannot carry a path", self.base_url))?;
            segments.pop_if_empty().extend(["api", "states"]);
            if let Some(entry) = entry {
                segments.push(entry.as_str());
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        request
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("{what} request failed"))
    }

    async fn post_state(&self, entry: &EntryId, cached: &CachedState) -> Result<()> {
        let url = self.states_url(Some(entry))?;
        let body = json!({
            "state": cached.state,
            "attributes": cached.merged_attributes(),
        });
        let response = self
            .send(self.http_client.post(url).json(&body), "state write")
            .await?;
        response
            .error_for_status()
            .with_context(|| format!("state write rejected for {entry}"))?;
        Ok(())
    }

    /// Cached copy of an entry created through this sink.
    async fn cached(&self, entry: &EntryId) -> Result<CachedState> {
        self.cache
            .lock()
            .await
            .get(entry)
            .cloned()
            .with_context(|| format!("{entry} does not exist"))
    }

    /// Writes `updated` and stores it in the cache on success.
    async fn commit(&self, entry: &EntryId, updated: CachedState) -> Result<()> {
        self.post_state(entry, &updated).await?;
        self.cache.lock().await.insert(entry.clone(), updated);
        Ok(())
    }
}

impl SensorSink for HassSink {
    async fn ensure_exists(&self, entry: &EntryId, options: &CreationOptions) -> Result<()> {
        if self.cache.lock().await.contains_key(entry) {
            return Ok(());
        }

        let mut base = Map::new();
        if let Some(name) = &options.friendly_name {
            base.insert(String::from("friendly_name"), Value::from(name.as_str()));
        }
        if let Some(unit) = &options.unit_of_measurement {
            base.insert(String::from("unit_of_measurement"), Value::from(unit.as_str()));
        }
        let created = CachedState {
            state: String::from(UNKNOWN_STATE),
            base,
            show: Map::new(),
        };

        self.commit(entry, created).await?;
        tracing::debug!(%entry, "Sensor created");
        Ok(())
    }

    async fn set_attributes(&self, entry: &EntryId, attributes: &ShowAttributes) -> Result<()> {
        let mut updated = self.cached(entry).await?;
        let Value::Object(show) =
            serde_json::to_value(attributes).context("failed to encode show attributes")?
        else {
            bail!("show attributes did not encode to an object");
        };
        updated.show = show;
        self.commit(entry, updated).await?;
        tracing::info!(
            %entry,
            title = %attributes.title,
            begin_time = %attributes.begin_time,
            upcoming = %attributes.upcoming,
            "Sensor attributes updated"
        );
        Ok(())
    }

    async fn set_value(&self, entry: &EntryId, value: &str) -> Result<()> {
        let mut updated = self.cached(entry).await?;
        updated.state = String::from(value);
        self.commit(entry, updated).await?;
        tracing::debug!(%entry, value, "Sensor value updated");
        Ok(())
    }

    async fn set_availability(&self, entry: &EntryId, availability: Availability) -> Result<()> {
        let mut updated = self.cached(entry).await?;
        match availability {
            // The next value write replaces `unavailable`.
            Availability::Up => Ok(()),
            Availability::Down => {
                updated.state = String::from(UNAVAILABLE_STATE);
                self.commit(entry, updated).await
            }
        }
    }

    async fn remove(&self, entry: &EntryId) -> Result<()> {
        let url = self.states_url(Some(entry))?;
        let response = self
            .send(self.http_client.delete(url), "state delete")
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            response
                .error_for_status()
                .with_context(|| format!("state delete rejected for {entry}"))?;
        }
        self.cache.lock().await.remove(entry);
        Ok(())
    }

    async fn current_value(&self, entry: &EntryId) -> Result<Option<String>> {
        if let Some(cached) = self.cache.lock().await.get(entry) {
            return Ok(Some(cached.state.clone()));
        }

        let url = self.states_url(Some(entry))?;
        let response = self.send(self.http_client.get(url), "state read").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let state: HassState = response
            .error_for_status()
            .with_context(|| format!("state read rejected for {entry}"))?
            .json()
            .await
            .with_context(|| format!("invalid state of {entry}"))?;
        Ok(Some(state.state))
    }

    async fn list_entries(&self, prefix: &str) -> Result<Vec<EntryId>> {
        let url = self.states_url(None)?;
        let states: Vec<HassState> = self
            .send(self.http_client.get(url), "state listing")
            .await?
            .error_for_status()
            .context("state listing rejected")?
            .json()
            .await
            .context("invalid state listing")?;

        Ok(states
            .into_iter()
            .filter(|s| s.entity_id.starts_with(prefix))
            .map(|s| EntryId::from_raw(s.entity_id))
            .collect())
    }
}
