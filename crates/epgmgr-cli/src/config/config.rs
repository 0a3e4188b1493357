//! `AppConfig` struct and TOML loading.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use epgmgr_api::ProviderSettings;
use epgmgr_core::{DEFAULT_POLL_INTERVAL, DEFAULT_REFRESH_TIMES, DEFAULT_SENSOR_PREFIX};
use serde::Deserialize;

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_sensor_prefix() -> String {
    String::from(DEFAULT_SENSOR_PREFIX)
}

fn default_refresh_times() -> Vec<String> {
    DEFAULT_REFRESH_TIMES.iter().map(|t| String::from(*t)).collect()
}

/// Top-level application configuration.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Seconds between two publish ticks of a station.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// First segment of every sensor id.
    #[serde(default = "default_sensor_prefix")]
    pub sensor_prefix: String,
    /// Refresh times for providers that configure none.
    #[serde(default = "default_refresh_times")]
    pub default_refresh_times: Vec<String>,
    /// Remove all prefixed sensors before starting.
    #[serde(default)]
    pub cleanup_sensors_on_startup: bool,
    /// Remove all prefixed sensors and exit.
    #[serde(default)]
    pub only_cleanup_and_end: bool,
    /// Home Assistant connection.
    #[serde(default)]
    pub sink: Option<SinkConfig>,
    /// Guide providers and their stations.
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            sensor_prefix: default_sensor_prefix(),
            default_refresh_times: default_refresh_times(),
            cleanup_sensors_on_startup: false,
            only_cleanup_and_end: false,
            sink: None,
            providers: Vec::new(),
        }
    }
}

/// `[sink]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SinkConfig {
    /// Home Assistant root URL.
    pub url: String,
    /// Long-lived access token.
    #[serde(default)]
    pub token: Option<String>,
    /// Environment variable holding the token.
    #[serde(default)]
    pub token_env: Option<String>,
}

impl SinkConfig {
    /// Token from `token`, else from the `token_env` variable.
    ///
    /// # Errors
    ///
    /// Returns an error if neither is set or the variable is missing.
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let Some(var) = &self.token_env else {
            bail!("sink token is not configured (set `token` or `token_env`)");
        };
        std::env::var(var).with_context(|| format!("environment variable {var} is not set"))
    }
}

impl AppConfig {
    /// Loads config from a TOML file. Returns default if file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Refresh times that apply to `provider`.
    #[must_use]
    pub fn refresh_times_for<'a>(&'a self, provider: &'a ProviderSettings) -> &'a [String] {
        if provider.refresh_times.is_empty() {
            &self.default_refresh_times
        } else {
            &provider.refresh_times
        }
    }

    /// Provider whose `name` or `kind` equals `key`.
    #[must_use]
    pub fn find_provider(&self, key: &str) -> Option<&ProviderSettings> {
        self.providers
            .iter()
            .find(|p| p.name.as_deref() == Some(key))
            .or_else(|| self.providers.iter().find(|p| p.kind == key))
    }
}
