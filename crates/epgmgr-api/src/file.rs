//! `JsonFileProvider` - guide listings from local JSON files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use epgmgr_core::{GuideProvider, Show};
use tracing::instrument;

use crate::wire::parse_shows;

/// Provider reading `{dir}/{station}.json` on every refresh.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    name: String,
    dir: PathBuf,
}

impl JsonFileProvider {
    /// Creates a provider reading listings from `dir`.
    #[must_use]
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    /// Listing file of `station`.
    #[must_use]
    pub fn listing_path(&self, station: &str) -> PathBuf {
        self.dir.join(format!("{station}.json"))
    }

    /// Listing directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl GuideProvider for JsonFileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(station = %station))]
    async fn list_shows(&self, station: &str) -> Result<Vec<Show>> {
        let path = self.listing_path(station);
        let json = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read guide listing {}", path.display()))?;
        parse_shows(&json, station)
    }

    #[instrument(skip_all)]
    async fn list_stations(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| {
                format!("failed to read listing directory {}", self.dir.display())
            })?;
        let mut stations = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                stations.push(String::from(stem));
            }
        }
        stations.sort();
        Ok(stations)
    }

    async fn describe_show(&self, show: &Show) -> Result<String> {
        Ok(show.description.clone().unwrap_or_default())
    }

    fn link_for(&self, show: &Show) -> String {
        show.link.clone().unwrap_or_default()
    }
}
