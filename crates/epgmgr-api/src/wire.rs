//! JSON listing format shared by the feed and file providers.
//!
//! A listing is a JSON array of shows:
//!
//! ```json
//! [
//!   {"title": "Tagesschau", "start": "2024-03-01T20:00:00", "duration": 15,
//!    "episode": null, "category": "News", "id": "ts-2000"}
//! ]
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use epgmgr_core::Show;
use serde::Deserialize;

/// Accepted local start time layouts.
const START_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// One show as delivered by a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedShow {
    /// Show title.
    pub title: String,
    /// Start time, local or RFC 3339 with offset.
    pub start: String,
    /// End time; used when `duration` is absent.
    #[serde(default)]
    pub end: Option<String>,
    /// Duration in minutes.
    #[serde(default)]
    pub duration: Option<u32>,
    /// Episode title or number.
    #[serde(default)]
    pub episode: Option<String>,
    /// Genre.
    #[serde(default, alias = "genre")]
    pub category: Option<String>,
    /// Long description.
    #[serde(default)]
    pub description: Option<String>,
    /// Detail page URL.
    #[serde(default)]
    pub link: Option<String>,
    /// Key for description lookups.
    #[serde(default)]
    pub id: Option<String>,
}

/// Parses a start or end time into local wall-clock time.
pub(crate) fn parse_local_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    START_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl FeedShow {
    /// Converts into a guide show of `station`.
    ///
    /// Returns `None` if the start time cannot be parsed.
    #[must_use]
    pub fn into_show(self, station: &str) -> Option<Show> {
        let start = parse_local_time(&self.start)?;
        let duration_minutes = self.duration.or_else(|| {
            let end = parse_local_time(self.end.as_deref()?)?;
            let minutes = end.signed_duration_since(start).num_minutes();
            u32::try_from(minutes).ok()
        });

        Some(Show {
            station: String::from(station),
            title: self.title,
            episode: non_empty(self.episode),
            start,
            duration_minutes,
            category: non_empty(self.category),
            description: non_empty(self.description),
            link: non_empty(self.link),
            id: non_empty(self.id),
        })
    }
}

/// Parses a JSON listing for `station`.
///
/// Shows with an unparsable start time are logged and skipped; listing
/// order is preserved.
///
/// # Errors
///
/// Returns an error if `json` is not an array of shows.
pub fn parse_shows(json: &str, station: &str) -> Result<Vec<Show>> {
    let raw: Vec<FeedShow> = serde_json::from_str(json)
        .with_context(|| format!("invalid guide listing for '{station}'"))?;

    Ok(raw
        .into_iter()
        .filter_map(|item| {
            let title = item.title.clone();
            let start = item.start.clone();
            let show = item.into_show(station);
            if show.is_none() {
                tracing::warn!(station, %title, %start, "Skipping show with invalid start time");
            }
            show
        })
        .collect())
}

/// Parses a station list: a JSON array of names, returned sorted and
/// without duplicates.
///
/// # Errors
///
/// Returns an error if `json` is not an array of strings.
pub fn parse_stations(json: &str) -> Result<Vec<String>> {
    let mut stations: Vec<String> =
        serde_json::from_str(json).context("invalid station list")?;
    stations.retain(|s| !s.trim().is_empty());
    stations.sort();
    stations.dedup();
    Ok(stations)
}
