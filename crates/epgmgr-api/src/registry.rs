//! Provider registry keyed by configured `kind`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use epgmgr_core::{EpgError, GuideProvider, Show};
use serde::Deserialize;
use url::Url;

use crate::feed::JsonFeedProvider;
use crate::file::JsonFileProvider;

/// Default User-Agent for HTTP providers.
pub const DEFAULT_USER_AGENT: &str = concat!("epgmgr/", env!("CARGO_PKG_VERSION"));

/// One `[[providers]]` table of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Registry key (`json-feed`, `json-file`).
    pub kind: String,
    /// Display name; defaults per kind.
    pub name: Option<String>,
    /// Stations served by this provider.
    pub stations: Vec<String>,
    /// Daily refresh times; empty means the global default.
    pub refresh_times: Vec<String>,
    /// Feed root for `json-feed`.
    pub base_url: Option<String>,
    /// Listing directory for `json-file`.
    pub dir: Option<PathBuf>,
    /// User-Agent for HTTP providers.
    pub user_agent: Option<String>,
    /// Minimum seconds between two feed requests.
    pub min_interval_secs: Option<u64>,
}

/// Constructor registered for a provider kind.
pub type ProviderFactory = fn(&ProviderSettings) -> Result<AnyProvider>;

/// Registered provider kinds.
pub const REGISTRY: &[(&str, ProviderFactory)] = &[
    ("json-feed", build_json_feed),
    ("json-file", build_json_file),
];

/// Provider built from the registry.
#[derive(Debug)]
pub enum AnyProvider {
    /// HTTP JSON feed.
    Feed(JsonFeedProvider),
    /// Local JSON files.
    File(JsonFileProvider),
}

impl GuideProvider for AnyProvider {
    fn name(&self) -> &str {
        match self {
            Self::Feed(p) => p.name(),
            Self::File(p) => p.name(),
        }
    }

    async fn list_shows(&self, station: &str) -> Result<Vec<Show>> {
        match self {
            Self::Feed(p) => p.list_shows(station).await,
            Self::File(p) => p.list_shows(station).await,
        }
    }

    async fn list_stations(&self) -> Result<Vec<String>> {
        match self {
            Self::Feed(p) => p.list_stations().await,
            Self::File(p) => p.list_stations().await,
        }
    }

    async fn describe_show(&self, show: &Show) -> Result<String> {
        match self {
            Self::Feed(p) => p.describe_show(show).await,
            Self::File(p) => p.describe_show(show).await,
        }
    }

    fn link_for(&self, show: &Show) -> String {
        match self {
            Self::Feed(p) => p.link_for(show),
            Self::File(p) => p.link_for(show),
        }
    }
}

/// Registered kind names, in registry order.
#[must_use]
pub fn registered_kinds() -> Vec<&'static str> {
    REGISTRY.iter().map(|(kind, _)| *kind).collect()
}

/// Builds the provider for `settings.kind`.
///
/// # Errors
///
/// Returns [`EpgError::UnknownProvider`] if the kind is not registered, or
/// the factory error if the settings are incomplete.
pub fn build_provider(settings: &ProviderSettings) -> Result<AnyProvider> {
    let Some((_, factory)) = REGISTRY.iter().find(|(kind, _)| *kind == settings.kind) else {
        return Err(EpgError::UnknownProvider(settings.kind.clone()).into());
    };
    factory(settings).with_context(|| format!("invalid settings for provider '{}'", settings.kind))
}

fn build_json_feed(settings: &ProviderSettings) -> Result<AnyProvider> {
    let raw_url = settings
        .base_url
        .as_deref()
        .context("base_url is required")?;
    let base_url = Url::parse(raw_url).with_context(|| format!("invalid base_url '{raw_url}'"))?;

    let mut builder = JsonFeedProvider::builder()
        .name(settings.name.as_deref().unwrap_or("JSON Feed"))
        .base_url(base_url)
        .user_agent(settings.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));
    if let Some(secs) = settings.min_interval_secs {
        builder = builder.min_interval(Duration::from_secs(secs));
    }
    Ok(AnyProvider::Feed(builder.build()?))
}

fn build_json_file(settings: &ProviderSettings) -> Result<AnyProvider> {
    let dir = settings.dir.clone().context("dir is required")?;
    let name = settings.name.as_deref().unwrap_or("JSON File");
    Ok(AnyProvider::File(JsonFileProvider::new(name, dir)))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn settings(kind: &str) -> ProviderSettings {
        ProviderSettings {
            kind: String::from(kind),
            ..ProviderSettings::default()
        }
    }

    #[test]
    fn test_registered_kinds() {
        assert_eq!(registered_kinds(), vec!["json-feed", "json-file"]);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        // Arrange & Act
        let err = build_provider(&settings("tv-spielfilm")).unwrap_err();

        // Assert
        assert!(matches!(
            err.downcast_ref::<EpgError>(),
            Some(EpgError::UnknownProvider(kind)) if kind == "tv-spielfilm"
        ));
        assert_eq!(err.to_string(), "unknown EPG data provider 'tv-spielfilm'");
    }

    #[test]
    fn test_json_feed_requires_base_url() {
        // Arrange & Act
        let err = build_provider(&settings("json-feed")).unwrap_err();

        // Assert
        assert!(format!("{err:#}").contains("base_url is required"));
    }

    #[test]
    fn test_json_feed_with_name() {
        // Arrange
        let mut s = settings("json-feed");
        s.name = Some(String::from("Hoerzu"));
        s.base_url = Some(String::from("http://localhost:8080/epg"));

        // Act
        let provider = build_provider(&s).unwrap();

        // Assert
        assert!(matches!(provider, AnyProvider::Feed(_)));
        assert_eq!(provider.name(), "Hoerzu");
    }

    #[test]
    fn test_json_file_default_name() {
        // Arrange
        let mut s = settings("json-file");
        s.dir = Some(PathBuf::from("/var/lib/epgmgr"));

        // Act
        let provider = build_provider(&s).unwrap();

        // Assert
        assert_eq!(provider.name(), "JSON File");
    }
}
